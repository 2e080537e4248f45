//! Persistent WebSocket subscription.
//!
//! A subscription is a one-way state machine: `Init` while connecting,
//! `Ready` once the handshake completes, `Stale` after any failure.
//! `Stale` is terminal, the owner replaces a stale subscription with a
//! fresh one instead of reconnecting in place.
//!
//! Messages sent while `Init` are queued in order and flushed after the
//! handshake; messages sent while `Stale` are dropped. Traffic in either
//! direction resets the heartbeat clock, so pings only go out over an
//! otherwise idle connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_tls, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::error::ConnectError;
use super::resolver::HostResolver;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Connecting, outbound messages are queued
    Init,
    /// Connected, messages flow
    Ready,
    /// Failed, terminal
    Stale,
}

/// Connection parameters for a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// `wss` endpoint
    pub url: String,
    /// Silence interval after which a heartbeat is emitted
    pub heartbeat_interval: Duration,
}

impl SubscriptionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Builds the heartbeat payload for the n-th ping. An empty payload is a
/// configuration error and stales the subscription.
pub type HeartbeatGenerator = Box<dyn FnMut(u64) -> String + Send>;

/// Callback for every inbound text frame.
pub type DataHandler = Box<dyn FnMut(String) + Send>;

/// Callback invoked once, with the error that staled the subscription.
pub type ErrorHandler = Box<dyn FnOnce(ConnectError) + Send>;

/// Handle to a live subscription task.
pub struct PersistentSubscription {
    tx: mpsc::UnboundedSender<String>,
    status: watch::Receiver<StreamStatus>,
}

impl PersistentSubscription {
    /// Spawn the subscription task and begin connecting.
    pub fn spawn(
        config: SubscriptionConfig,
        resolver: HostResolver,
        data_handler: DataHandler,
        error_handler: ErrorHandler,
        heartbeat: HeartbeatGenerator,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StreamStatus::Init);

        tokio::spawn(run_subscription(
            config,
            resolver,
            rx,
            status_tx,
            data_handler,
            error_handler,
            heartbeat,
        ));

        Self {
            tx,
            status: status_rx,
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    /// Queue a text message for delivery.
    ///
    /// While `Init` the message waits for the handshake; once `Stale` it
    /// is silently dropped.
    pub fn send(&self, message: impl Into<String>) {
        if self.status() == StreamStatus::Stale {
            debug!("Dropping message for stale subscription");
            return;
        }
        let _ = self.tx.send(message.into());
    }

    /// Wait until the subscription leaves `Init`.
    pub async fn wait_ready(&mut self) -> StreamStatus {
        while *self.status.borrow() == StreamStatus::Init {
            if self.status.changed().await.is_err() {
                return StreamStatus::Stale;
            }
        }
        *self.status.borrow()
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn run_subscription(
    config: SubscriptionConfig,
    resolver: HostResolver,
    mut rx: mpsc::UnboundedReceiver<String>,
    status_tx: watch::Sender<StreamStatus>,
    mut data_handler: DataHandler,
    error_handler: ErrorHandler,
    mut heartbeat: HeartbeatGenerator,
) {
    let mut stream = loop {
        match connect(&config.url, &resolver).await {
            Ok(stream) => break stream,
            Err(e) => {
                // Handles dropped while we were connecting
                if status_tx.receiver_count() == 0 && rx.is_closed() {
                    return;
                }
                warn!(url = %config.url, error = %e, "Connect failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    };

    info!(url = %config.url, "Subscription established");
    let _ = status_tx.send(StreamStatus::Ready);

    let mut ping_counter: u64 = 0;
    // Any traffic counts as liveness, reads and writes alike
    let mut last_activity = Instant::now();

    let stale_error = loop {
        let heartbeat_at = last_activity + config.heartbeat_interval;

        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        data_handler(text);
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = stream.send(Message::Pong(payload)).await {
                            break ConnectError::Stream(e.to_string());
                        }
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "no close frame".to_string());
                        break ConnectError::Closed(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break ConnectError::Stream(e.to_string()),
                    None => break ConnectError::Closed("stream ended".to_string()),
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(e) = stream.send(Message::Text(message)).await {
                            break ConnectError::Stream(e.to_string());
                        }
                        last_activity = Instant::now();
                    }
                    // All handles dropped, terminate quietly
                    None => {
                        let _ = stream.close(None).await;
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(heartbeat_at) => {
                ping_counter += 1;
                let payload = heartbeat(ping_counter);
                if payload.is_empty() {
                    break ConnectError::EmptyHeartbeat;
                }
                if let Err(e) = stream.send(Message::Text(payload)).await {
                    break ConnectError::Stream(e.to_string());
                }
                last_activity = Instant::now();
            }
        }
    };

    error!(url = %config.url, error = %stale_error, "Subscription went stale");
    let _ = status_tx.send(StreamStatus::Stale);
    error_handler(stale_error);
}

async fn connect(url: &str, resolver: &HostResolver) -> Result<WsStream, ConnectError> {
    let parsed =
        Url::parse(url).map_err(|e| ConnectError::InvalidUrl(url.to_string(), e.to_string()))?;
    if parsed.scheme() != "wss" {
        return Err(ConnectError::InvalidUrl(
            url.to_string(),
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| ConnectError::InvalidUrl(url.to_string(), "missing host".to_string()))?
        .to_string();
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = resolver.resolve(&host, port).await?;

    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addrs.as_slice()))
        .await
        .map_err(|_| ConnectError::Timeout(CONNECT_TIMEOUT))?
        .map_err(|e| ConnectError::Connection(e.to_string()))?;

    let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, client_async_tls(url, tcp))
        .await
        .map_err(|_| ConnectError::Timeout(CONNECT_TIMEOUT))?
        .map_err(|e| ConnectError::Handshake(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_in_init() {
        let subscription = PersistentSubscription::spawn(
            SubscriptionConfig::new("wss://stream.example.com/v5/public/spot"),
            HostResolver::new(),
            Box::new(|_| {}),
            Box::new(|_| {}),
            Box::new(|n| format!("ping {n}")),
        );
        assert_eq!(subscription.status(), StreamStatus::Init);
    }

    #[tokio::test]
    async fn test_send_while_init_does_not_panic() {
        let subscription = PersistentSubscription::spawn(
            SubscriptionConfig::new("wss://stream.example.com/v5/public/spot"),
            HostResolver::new(),
            Box::new(|_| {}),
            Box::new(|_| {}),
            Box::new(|n| format!("ping {n}")),
        );
        subscription.send(r#"{"op":"subscribe","args":["publicTrade.BTCUSDT"]}"#);
        assert_eq!(subscription.status(), StreamStatus::Init);
    }

    #[tokio::test]
    async fn test_connect_rejects_plain_ws() {
        let resolver = HostResolver::new();
        let err = connect("ws://example.com/feed", &resolver).await.unwrap_err();
        assert!(matches!(err, ConnectError::InvalidUrl(..)));
    }
}
