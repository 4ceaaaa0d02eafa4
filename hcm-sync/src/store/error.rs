//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint violated, e.g. a duplicate `(vendor, cloud_id)` create race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller exceeded the store batch limit.
    #[error("batch of {size} exceeds store limit {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Stored data could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Database driver error.
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column (de)serialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
