//! Saga error types.

use thiserror::Error;

use common::{OrderId, ProductId};
use domain::{DomainError, OrderError};
use event_bus::BusError;
use store::StoreError;

/// Errors that can occur during saga operations.
///
/// The taxonomy follows the propagation policy: validation and business
/// rejections surface to the caller unchanged, transient and concurrency
/// failures are absorbed by retries inside the coordinator, and only
/// compensation exhaustion escapes as a system-level failure.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Bad input; never retried.
    #[error("Validation error: {0}")]
    Validation(#[from] OrderError),

    /// Business rejection from the reservation engine; never retried.
    #[error(
        "Insufficient stock for {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Business rejection from the payment collaborator; never retried.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// A dependency kept failing transiently past the retry ceiling.
    #[error("Transient failure in step '{step}': {reason}")]
    TransientDependency { step: String, reason: String },

    /// Compensation itself failed after exhausting retries. The order is
    /// parked in `FailedManual` for operator intervention.
    #[error("Compensation failed for order {order_id}: {reason}")]
    CompensationFailure { order_id: OrderId, reason: String },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(DomainError),

    /// Record store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DomainError> for SagaError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::OrderNotFound(order_id) => SagaError::OrderNotFound(order_id),
            other => SagaError::Domain(other),
        }
    }
}

impl SagaError {
    /// Returns true for rejections the customer caused (as opposed to
    /// infrastructure trouble).
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            SagaError::Validation(_)
                | SagaError::InsufficientStock { .. }
                | SagaError::PaymentDeclined(_)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
