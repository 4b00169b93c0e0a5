use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-swap update found a different version than expected.
    #[error("Version conflict for {key}: expected version {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: Version,
        actual: Version,
    },

    /// An insert targeted a key that already holds a record.
    #[error("Record already exists: {key}")]
    AlreadyExists { key: String },

    /// An update targeted a key with no record.
    #[error("Record not found: {key}")]
    NotFound { key: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
