//! Connection layer error taxonomy.

use std::time::Duration;

use thiserror::Error;

use feed_common::error::{ErrorCategory, ErrorClassification};

/// Transport and subscription errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConnectError {
    /// URL could not be parsed or misses required parts
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, String),

    /// DNS resolution failed
    #[error("Host resolution failed for '{host}': {reason}")]
    Resolve { host: String, reason: String },

    /// TCP connect failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Connect or handshake deadline elapsed
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// TLS or WebSocket handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Read or write on an established stream failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// The peer closed the connection
    #[error("Connection closed: {0}")]
    Closed(String),

    /// The heartbeat generator produced an empty message
    #[error("Heartbeat generator produced an empty message")]
    EmptyHeartbeat,
}

impl ErrorClassification for ConnectError {
    fn category(&self) -> ErrorCategory {
        match self {
            ConnectError::InvalidUrl(..) => ErrorCategory::Configuration,
            // A failing lookup is usually a bad host name in config
            ConnectError::Resolve { .. } => ErrorCategory::Configuration,
            ConnectError::Connection(_) => ErrorCategory::Transient,
            ConnectError::Timeout(_) => ErrorCategory::Transient,
            ConnectError::Handshake(_) => ErrorCategory::Transient,
            ConnectError::Stream(_) => ErrorCategory::Transient,
            ConnectError::Closed(_) => ErrorCategory::Transient,
            ConnectError::EmptyHeartbeat => ErrorCategory::Configuration,
        }
    }

    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            ConnectError::Connection(_) | ConnectError::Timeout(_) => {
                Some(Duration::from_millis(250))
            }
            ConnectError::Stream(_) | ConnectError::Closed(_) => {
                Some(Duration::from_millis(100))
            }
            _ => None,
        }
    }
}

/// HTTP one-shot query errors, classified by status range.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Connection layer failure before any response arrived
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Request could not be sent or the response not read
    #[error("Request failed for '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// 3xx response (redirects are disabled on purpose)
    #[error("HTTP redirect {status} for '{url}'")]
    Redirect { status: u16, url: String },

    /// 4xx response
    #[error("HTTP client error {status} for '{url}'")]
    Client { status: u16, url: String },

    /// 5xx response
    #[error("HTTP server error {status} for '{url}'")]
    Server { status: u16, url: String },

    /// Any other non-success status
    #[error("HTTP error {status} for '{url}'")]
    Status { status: u16, url: String },
}

impl HttpError {
    /// Classify a non-2xx status into the range-based taxonomy.
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        match status {
            300..=399 => HttpError::Redirect { status, url },
            400..=499 => HttpError::Client { status, url },
            500..=599 => HttpError::Server { status, url },
            _ => HttpError::Status { status, url },
        }
    }

    /// The offending status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Redirect { status, .. }
            | HttpError::Client { status, .. }
            | HttpError::Server { status, .. }
            | HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl ErrorClassification for HttpError {
    fn category(&self) -> ErrorCategory {
        match self {
            HttpError::Connect(e) => e.category(),
            HttpError::Transport { .. } => ErrorCategory::Transient,
            HttpError::Redirect { .. } => ErrorCategory::Permanent,
            HttpError::Client { status: 429, .. } => ErrorCategory::ResourceExhausted,
            HttpError::Client { .. } => ErrorCategory::Permanent,
            HttpError::Server { .. } => ErrorCategory::Transient,
            HttpError::Status { .. } => ErrorCategory::Permanent,
        }
    }
}
