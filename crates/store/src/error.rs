use std::time::Duration;

use common::StockKey;
use thiserror::Error;

use crate::model::{UnknownStatus, Version};

/// Errors that can occur when interacting with the inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock write carried a stale version.
    #[error("Concurrency conflict on stock {key}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        key: StockKey,
        expected: Version,
        actual: Version,
    },

    /// The row targeted by an update does not exist.
    #[error("{table} row not found: {id}")]
    RowNotFound { table: &'static str, id: String },

    /// An insert collided with an existing primary key.
    #[error("{table} row already exists: {id}")]
    AlreadyExists { table: &'static str, id: String },

    /// A single store call exceeded its deadline.
    #[error("Store operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A write was rejected by the backend.
    #[error("Store write failed during '{operation}': {reason}")]
    WriteFailed {
        operation: &'static str,
        reason: String,
    },

    /// A persisted value could not be decoded.
    #[error("Corrupt row: {0}")]
    Decode(#[from] UnknownStatus),

    /// A persisted quantity does not fit the model type.
    #[error("Column {column} out of range: {value}")]
    OutOfRange { column: &'static str, value: i64 },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for failures that may succeed if the whole operation is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. }
                | StoreError::AlreadyExists { .. }
                | StoreError::Timeout { .. }
                | StoreError::WriteFailed { .. }
                | StoreError::Database(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
