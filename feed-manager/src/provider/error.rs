//! Provider error taxonomy.

use thiserror::Error;

use feed_common::data::FixedPointError;
use feed_common::error::{ErrorCategory, ErrorClassification};

use crate::connect::{ConnectError, HttpError};

/// Errors raised while talking to an exchange.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Response body did not decode into the expected shape
    #[error("Response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The exchange answered with a non-zero return code
    #[error("Exchange error {code}: {message}")]
    Api { code: i64, message: String },

    /// Topic string does not follow `title[.depth][.symbol]`
    #[error("Malformed topic '{0}'")]
    Topic(String),

    /// Push payload named a symbol other than the subscribed one
    #[error("Symbol mismatch: expected '{expected}', got '{actual}'")]
    SymbolMismatch { expected: String, actual: String },

    /// Push payload for a symbol nothing subscribed to
    #[error("No manager for symbol '{0}'")]
    UnknownSymbol(String),

    /// Instrument query returned no usable entry
    #[error("Instrument '{0}' not found")]
    InstrumentNotFound(String),

    /// A field the protocol requires was absent or empty
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// Unexpected enumeration value on the wire
    #[error("Unexpected value for '{field}': '{value}'")]
    UnexpectedValue { field: &'static str, value: String },

    #[error(transparent)]
    Value(#[from] FixedPointError),
}

impl ErrorClassification for ProviderError {
    fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Http(e) => e.category(),
            ProviderError::Connect(e) => e.category(),
            // 10006 is Bybit's rate limit code
            ProviderError::Api { code: 10006, .. } => ErrorCategory::ResourceExhausted,
            ProviderError::Api { .. } => ErrorCategory::Permanent,
            _ => ErrorCategory::Permanent,
        }
    }
}
