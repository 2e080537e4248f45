//! Caching host resolver.
//!
//! A single task owns the cache and serves lookups over a channel, so
//! concurrent callers never race on DNS. Successful lookups are cached for
//! the lifetime of the resolver; failures are not, a retry goes back to
//! the system resolver.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::error::ConnectError;

struct ResolveRequest {
    host: String,
    port: u16,
    reply: oneshot::Sender<Result<Vec<SocketAddr>, ConnectError>>,
}

/// Cloneable handle to the resolver task.
///
/// The task terminates once every handle is dropped.
#[derive(Debug, Clone)]
pub struct HostResolver {
    tx: mpsc::Sender<ResolveRequest>,
    lookups: Arc<AtomicUsize>,
}

impl HostResolver {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(32);
        let lookups = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_resolver(rx, Arc::clone(&lookups)));
        Self { tx, lookups }
    }

    /// Resolve `host:port` to socket addresses, hitting the cache first.
    pub async fn resolve(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<SocketAddr>, ConnectError> {
        let (reply, response) = oneshot::channel();
        let request = ResolveRequest {
            host: host.to_string(),
            port,
            reply,
        };

        self.tx
            .send(request)
            .await
            .map_err(|_| ConnectError::Closed("resolver task terminated".to_string()))?;

        response
            .await
            .map_err(|_| ConnectError::Closed("resolver task terminated".to_string()))?
    }

    /// Number of lookups that actually hit the system resolver.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl Default for HostResolver {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_resolver(mut rx: mpsc::Receiver<ResolveRequest>, lookups: Arc<AtomicUsize>) {
    let mut cache: HashMap<String, Vec<SocketAddr>> = HashMap::new();

    while let Some(request) = rx.recv().await {
        let key = format!("{}:{}", request.host, request.port);

        let result = match cache.get(&key) {
            Some(addrs) => {
                debug!(host = %key, "Resolver cache hit");
                Ok(addrs.clone())
            }
            None => {
                lookups.fetch_add(1, Ordering::Relaxed);
                match tokio::net::lookup_host(key.clone()).await {
                    Ok(addrs) => {
                        let addrs: Vec<SocketAddr> = addrs.collect();
                        if addrs.is_empty() {
                            Err(ConnectError::Resolve {
                                host: request.host.clone(),
                                reason: "no addresses returned".to_string(),
                            })
                        } else {
                            debug!(host = %key, count = addrs.len(), "Resolved host");
                            cache.insert(key, addrs.clone());
                            Ok(addrs)
                        }
                    }
                    Err(e) => {
                        warn!(host = %key, error = %e, "Host resolution failed");
                        Err(ConnectError::Resolve {
                            host: request.host.clone(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
        };

        // Caller may have given up waiting, nothing to do then
        let _ = request.reply.send(result);
    }

    debug!("Resolver task terminated");
}
