//! Typed message dispatch.
//!
//! A [`TypedDispatcher`] decouples the network read loop from message
//! processing: `dispatch` enqueues the raw payload onto a small bounded
//! queue and returns immediately, a single drain task tries each acceptor
//! in registration order until one takes the payload.
//!
//! Back-pressure policy is deliberately lossy: when the queue is full the
//! payload is dropped with a warning. The read loop must never block on a
//! slow consumer, and market-data payloads are superseded by newer ones
//! anyway.

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bounded queue depth between the read loop and the drain task.
pub const QUEUE_CAPACITY: usize = 16;

/// An acceptor inspects a raw payload and returns whether it consumed it.
pub type Acceptor = Box<dyn FnMut(&str) -> bool + Send>;

/// Build an acceptor that accepts payloads decoding into `T`.
///
/// Decode failure just means "not mine": the dispatcher moves on to the
/// next acceptor. Registration order is the priority order, so put the
/// more specific shapes first.
pub fn json_acceptor<T, F>(mut handler: F) -> Acceptor
where
    T: DeserializeOwned,
    F: FnMut(T) + Send + 'static,
{
    Box::new(move |raw: &str| match serde_json::from_str::<T>(raw) {
        Ok(value) => {
            handler(value);
            true
        }
        Err(_) => false,
    })
}

/// Ordered trial dispatch over a bounded queue.
pub struct TypedDispatcher {
    tx: mpsc::Sender<String>,
}

impl TypedDispatcher {
    /// Create a dispatcher and spawn its drain task.
    ///
    /// The drain task ends when every dispatcher handle has been dropped
    /// and the queue has emptied.
    pub fn new(acceptors: Vec<Acceptor>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(drain(rx, acceptors));
        Self { tx }
    }

    /// Enqueue a payload without blocking.
    pub fn dispatch(&self, raw: impl Into<String>) {
        match self.tx.try_send(raw.into()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dispatch queue full, dropping payload");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("dispatch queue closed, dropping payload");
            }
        }
    }
}

impl Clone for TypedDispatcher {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<String>, mut acceptors: Vec<Acceptor>) {
    while let Some(raw) = rx.recv().await {
        if !route(&mut acceptors, &raw) {
            // Mixed topics share one stream, unmatched payloads are normal
            debug!(len = raw.len(), "no acceptor for payload");
        }
    }
}

/// Try each acceptor in order, stopping at the first that accepts.
fn route(acceptors: &mut [Acceptor], raw: &str) -> bool {
    acceptors.iter_mut().any(|accept| accept(raw))
}
