//! Common error types shared across crates.
//!
//! Crate-specific errors can wrap these using `#[from]`.

use thiserror::Error;

/// Candle aggregation errors.
///
/// Ordering violations are data-integrity errors: the exchange stream (or
/// the caller) delivered trades out of order, and silently tolerating that
/// would corrupt already-sealed buckets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CandleError {
    /// Trade timestamp falls inside or before an already sealed bucket
    #[error("trade at {trade_ts}ms precedes sealed bucket starting at {sealed_start}ms")]
    TradeBeforeSealed { trade_ts: u64, sealed_start: u64 },

    /// Trade timestamp precedes the last processed trade
    #[error("trade at {trade_ts}ms precedes last processed trade at {last_ts}ms")]
    TradeBeforeLast { trade_ts: u64, last_ts: u64 },
}

/// Serialization and parsing errors.
///
/// Use this for JSON and decimal string conversions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SerializationError {
    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(String),

    /// Decimal conversion failed
    #[error("Decimal conversion error: {0}")]
    Decimal(String),

    /// Invalid format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json(err.to_string())
    }
}

impl From<rust_decimal::Error> for SerializationError {
    fn from(err: rust_decimal::Error) -> Self {
        SerializationError::Decimal(err.to_string())
    }
}

/// Validation errors for data integrity checks.
///
/// Use this for validating incoming data before processing.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Required field is empty or missing
    #[error("{field} is required but was empty")]
    Required { field: &'static str },

    /// Field has invalid format
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: &'static str, reason: String },

    /// Value does not match its expected counterpart
    #[error("{field} mismatch: expected '{expected}', got '{actual}'")]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// Custom validation failed
    #[error("Validation failed: {0}")]
    Custom(String),
}

impl ValidationError {
    /// Create a Required validation error
    pub fn required(field: &'static str) -> Self {
        ValidationError::Required { field }
    }

    /// Create an InvalidFormat validation error
    pub fn invalid_format(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field,
            reason: reason.into(),
        }
    }

    /// Create a Mismatch validation error
    pub fn mismatch(
        field: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        ValidationError::Mismatch {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_error_display() {
        let err = CandleError::TradeBeforeSealed {
            trade_ts: 500,
            sealed_start: 1000,
        };
        assert!(err.to_string().contains("precedes sealed bucket"));

        let err = CandleError::TradeBeforeLast {
            trade_ts: 100,
            last_ts: 200,
        };
        assert!(err.to_string().contains("precedes last processed trade"));
    }

    #[test]
    fn test_validation_error_constructors() {
        let err = ValidationError::required("symbol");
        assert!(err.to_string().contains("symbol is required"));

        let err = ValidationError::mismatch("symbol", "BTCUSDT", "ETHUSDT");
        assert!(err.to_string().contains("expected 'BTCUSDT'"));
    }
}
