//! Fulfillment error types.

use std::time::Duration;

use common::StockKey;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while reserving, shipping, draining or moving stock.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The request was malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The source row holds less than the requested quantity.
    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: StockKey,
        requested: u32,
        available: u32,
    },

    /// A single store call missed its deadline.
    #[error("Store call '{operation}' timed out after {after:?}")]
    StoreTimeout {
        operation: &'static str,
        after: Duration,
    },

    /// A row changed between read and write.
    #[error("{resource} was modified concurrently")]
    Conflict { resource: String },

    /// The store rejected a read or write.
    #[error("Store error: {0}")]
    StoreWrite(StoreError),

    /// A compensating write failed, leaving partial effects behind.
    #[error("Compensation step '{step}' failed ({reason}) while recovering from: {original}")]
    CompensationFailed {
        step: &'static str,
        reason: String,
        original: Box<FulfillmentError>,
    },

    /// An audit or status write failed. Logged only.
    #[error("Best-effort write '{record}' failed: {reason}")]
    AuditWrite { record: &'static str, reason: String },
}

impl FulfillmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        FulfillmentError::Validation(message.into())
    }

    pub fn conflict(resource: impl Into<String>) -> Self {
        FulfillmentError::Conflict {
            resource: resource.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FulfillmentError::Validation(_) => "validation",
            FulfillmentError::NotFound { .. } => "not_found",
            FulfillmentError::InsufficientStock { .. } => "insufficient_stock",
            FulfillmentError::StoreTimeout { .. } => "store_timeout",
            FulfillmentError::Conflict { .. } => "conflict",
            FulfillmentError::StoreWrite(_) => "store_write",
            FulfillmentError::CompensationFailed { .. } => "compensation_failed",
            FulfillmentError::AuditWrite { .. } => "audit_write",
        }
    }

    /// Returns true when the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::StoreTimeout { .. } | FulfillmentError::Conflict { .. } => true,
            FulfillmentError::StoreWrite(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout { operation, after } => {
                FulfillmentError::StoreTimeout { operation, after }
            }
            StoreError::ConcurrencyConflict { key, .. } => FulfillmentError::Conflict {
                resource: format!("stock {key}"),
            },
            StoreError::RowNotFound { table, id } => FulfillmentError::NotFound { entity: table, id },
            other => FulfillmentError::StoreWrite(other),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ProductId, WarehouseId};
    use store::Version;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    #[test]
    fn store_errors_map_to_kinds() {
        let timeout: FulfillmentError = StoreError::Timeout {
            operation: "get_stock",
            after: Duration::from_secs(10),
        }
        .into();
        assert_eq!(timeout.kind(), "store_timeout");
        assert!(timeout.is_retryable());

        let conflict: FulfillmentError = StoreError::ConcurrencyConflict {
            key: key(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert_eq!(conflict.kind(), "conflict");
        assert!(conflict.is_retryable());

        let missing: FulfillmentError = StoreError::RowNotFound {
            table: "stock",
            id: "x".to_string(),
        }
        .into();
        assert_eq!(missing.kind(), "not_found");
        assert!(!missing.is_retryable());

        let write: FulfillmentError = StoreError::WriteFailed {
            operation: "insert_backorder",
            reason: "boom".to_string(),
        }
        .into();
        assert_eq!(write.kind(), "store_write");
        assert!(write.is_retryable());
    }

    #[test]
    fn business_errors_are_not_retryable() {
        assert!(!FulfillmentError::validation("quantity must be positive").is_retryable());
        assert!(!FulfillmentError::not_found("stock", key()).is_retryable());
        assert!(
            !FulfillmentError::InsufficientStock {
                key: key(),
                requested: 5,
                available: 1,
            }
            .is_retryable()
        );
    }

    #[test]
    fn compensation_failure_keeps_original() {
        let original = FulfillmentError::conflict(format!("stock {}", key()));
        let err = FulfillmentError::CompensationFailed {
            step: "delete_reservations",
            reason: "store down".to_string(),
            original: Box::new(original),
        };
        assert_eq!(err.kind(), "compensation_failed");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("modified concurrently"));
    }
}
