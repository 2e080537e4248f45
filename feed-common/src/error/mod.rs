//! Error types and classification.
//!
//! Each concern has its own `thiserror` enum; the [`ErrorClassification`]
//! trait lets callers make retry decisions without matching on concrete
//! error types.

mod common;
mod traits;

pub use common::{CandleError, SerializationError, ValidationError};
pub use traits::{retry_with_backoff, ErrorCategory, ErrorClassification};
