//! Projection error types.

use thiserror::Error;

/// Errors that can occur while applying events to a projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Ledger error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
