//! Exchange providers.

pub mod bybit;
pub mod error;

pub use error::ProviderError;
