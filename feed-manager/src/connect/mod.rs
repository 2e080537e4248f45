//! Connection layer: host resolution, one-shot HTTPS queries and
//! persistent WebSocket subscriptions.

pub mod error;
pub mod http;
pub mod resolver;
pub mod websocket;

pub use error::{ConnectError, HttpError};
pub use http::OneShotQuery;
pub use resolver::HostResolver;
pub use websocket::{
    HeartbeatGenerator, PersistentSubscription, StreamStatus, SubscriptionConfig,
};
