//! Domain error types.

use thiserror::Error;

use common::{OrderId, ProductId};
use store::StoreError;

use crate::status::OrderStatus;

/// Validation and state-machine errors on the order entity.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An order must contain at least one line item.
    #[error("Order has no line items")]
    NoLineItems,

    /// Line item quantities must be positive.
    #[error("Invalid quantity for {product_id}: must be positive")]
    InvalidQuantity { product_id: ProductId },

    /// Line item prices must be non-negative.
    #[error("Invalid unit price for {product_id}")]
    InvalidPrice { product_id: ProductId },

    /// The requested status change is not in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred on the order entity.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
