use thiserror::Error;

use common::{OrderId, ProductId};
use store::StoreError;

/// Errors that can occur during reservation operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough unreserved stock for the request. A business rejection,
    /// never retried.
    #[error(
        "Insufficient stock for {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Commit or release targeted a reservation that was never made.
    #[error("No reservation for order {order_id}, product {product_id}")]
    ReservationNotFound {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// A restock would drop stock below the units currently held.
    #[error("Stock {stock} below reserved {reserved} for {product_id}")]
    StockBelowReserved {
        product_id: ProductId,
        stock: u32,
        reserved: u32,
    },

    /// Internal compare-and-swap retries were exhausted under contention.
    #[error("Concurrent updates exhausted retries for {product_id}")]
    Concurrency { product_id: ProductId },

    /// Record store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    Bus(#[from] event_bus::BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for reservation operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
