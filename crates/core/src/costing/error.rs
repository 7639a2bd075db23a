//! Costing error types.
//!
//! Every failure leaves layers and the ledger untouched for the call that
//! produced it. Only `StaleLayer` and `StaleSelection` are retried inside the
//! engine; they surface to callers as `Concurrency` once the attempt budget is
//! spent.

use rust_decimal::Decimal;
use stockcost_shared::AppError;
use stockcost_shared::types::{CostLayerId, ProductId};
use thiserror::Error;

/// Errors that can occur during costing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostingError {
    /// Negative or zero quantity/cost, malformed method, or bad input shape.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No available layers, or requested layer ids are missing/unavailable.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested quantity exceeds what the available layers hold.
    #[error("Insufficient inventory. Need {requested} units, but only {available} available")]
    InsufficientInventory {
        /// Quantity the caller asked for.
        requested: Decimal,
        /// Quantity held by available layers at read time.
        available: Decimal,
    },

    /// Optimistic precondition kept failing until the retry budget ran out.
    #[error("Concurrent modification detected after {attempts} attempts, please retry")]
    Concurrency {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A staged layer mutation no longer matches the stored layer.
    #[error("Cost layer {0} changed since it was read")]
    StaleLayer(CostLayerId),

    /// The set of consumable layers a selection was planned on has changed.
    #[error("Available cost layers of product {0} changed since they were read")]
    StaleSelection(ProductId),

    /// The backing store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl CostingError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a persistence error.
    #[must_use]
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            Self::Concurrency { .. } | Self::StaleLayer(_) | Self::StaleSelection(_) => {
                "CONCURRENT_MODIFICATION"
            },
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Concurrency { .. } | Self::StaleLayer(_) | Self::StaleSelection(_) => 409,
            Self::InsufficientInventory { .. } => 422,
            Self::Persistence(_) => 500,
        }
    }

    /// Returns true if the engine should restart the call from the read step.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleLayer(_) | Self::StaleSelection(_))
    }
}

impl From<CostingError> for AppError {
    fn from(err: CostingError) -> Self {
        let message = err.to_string();
        match err {
            CostingError::Validation(msg) => Self::Validation(msg),
            CostingError::NotFound(msg) => Self::NotFound(msg),
            CostingError::InsufficientInventory { .. } => Self::BusinessRule(message),
            CostingError::Concurrency { .. }
            | CostingError::StaleLayer(_)
            | CostingError::StaleSelection(_) => Self::Conflict(message),
            CostingError::Persistence(msg) => Self::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CostingError::validation("bad").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            CostingError::InsufficientInventory {
                requested: dec!(20),
                available: dec!(15),
            }
            .error_code(),
            "INSUFFICIENT_INVENTORY"
        );
        assert_eq!(
            CostingError::Concurrency { attempts: 3 }.error_code(),
            "CONCURRENT_MODIFICATION"
        );
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(CostingError::validation("x").http_status_code(), 400);
        assert_eq!(CostingError::not_found("x").http_status_code(), 404);
        assert_eq!(
            CostingError::Concurrency { attempts: 1 }.http_status_code(),
            409
        );
        assert_eq!(CostingError::persistence("x").http_status_code(), 500);
    }

    #[test]
    fn test_only_stale_reads_are_retryable() {
        assert!(CostingError::StaleLayer(CostLayerId::new()).is_retryable());
        assert!(CostingError::StaleSelection(ProductId::new()).is_retryable());
        assert!(!CostingError::Concurrency { attempts: 3 }.is_retryable());
        assert!(!CostingError::persistence("down").is_retryable());
        assert!(!CostingError::validation("x").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CostingError::InsufficientInventory {
            requested: dec!(20),
            available: dec!(15),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient inventory. Need 20 units, but only 15 available"
        );
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = CostingError::InsufficientInventory {
            requested: dec!(2),
            available: dec!(1),
        }
        .into();
        assert_eq!(app.status_code(), 422);

        let app: AppError = CostingError::Concurrency { attempts: 3 }.into();
        assert_eq!(app.error_code(), "CONFLICT");

        let app: AppError = CostingError::persistence("connection refused").into();
        assert_eq!(app.to_string(), "Database error: connection refused");
    }
}
