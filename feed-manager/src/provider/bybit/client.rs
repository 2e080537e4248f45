//! Bybit v5 client.
//!
//! REST calls go through [`OneShotQuery`] with the shared resolver; the
//! stream side is a supervised [`PersistentSubscription`]. A stale
//! subscription is never reconnected in place, the supervisor builds a
//! replacement and re-issues every tracked subscription on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use feed_common::dispatch::{json_acceptor, Acceptor, TypedDispatcher};

use crate::connect::{
    HostResolver, OneShotQuery, PersistentSubscription, SubscriptionConfig,
};
use crate::manager::{InstrumentMetadata, MarketDataManager};
use crate::provider::error::ProviderError;

use super::topic::Topic;
use super::types::{
    ApiResponse, InstrumentInfo, ListResult, OpResponse, OrderBookPush, PushEnvelope,
    RecentTrade, TimeResult, TradePush,
};

/// Endpoint configuration for one Bybit environment.
#[derive(Debug, Clone)]
pub struct BybitConfig {
    /// REST base, e.g. `https://api.bybit.com`
    pub rest_url: String,
    /// Stream endpoint, e.g. `wss://stream.bybit.com/v5/public/spot`
    pub ws_url: String,
    /// Product category, `spot` here
    pub category: String,
    /// Order book depth to subscribe at
    pub depth: u32,
    /// Idle interval before a ping goes out
    pub heartbeat_secs: u64,
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.bybit.com".to_string(),
            ws_url: "wss://stream.bybit.com/v5/public/spot".to_string(),
            category: "spot".to_string(),
            depth: 50,
            heartbeat_secs: 15,
        }
    }
}

type Managers = Arc<RwLock<HashMap<String, Arc<MarketDataManager>>>>;

/// Bybit market-data client.
pub struct BybitClient {
    config: BybitConfig,
    resolver: HostResolver,
    managers: Managers,
    /// server time minus local time, milliseconds
    time_offset_ms: AtomicI64,
    stream: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl BybitClient {
    pub fn new(config: BybitConfig, resolver: HostResolver) -> Arc<Self> {
        Arc::new(Self {
            config,
            resolver,
            managers: Arc::new(RwLock::new(HashMap::new())),
            time_offset_ms: AtomicI64::new(0),
            stream: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<OneShotQuery, ProviderError> {
        let url = format!("{}{}", self.config.rest_url.trim_end_matches('/'), path);
        Ok(OneShotQuery::new(&url, self.resolver.clone())?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, ProviderError> {
        let body = self.endpoint(path)?.execute(query).await?;
        let response: ApiResponse<T> = serde_json::from_str(&body)?;
        if response.ret_code != 0 {
            return Err(ProviderError::Api {
                code: response.ret_code,
                message: response.ret_msg,
            });
        }
        Ok(response)
    }

    /// Fetch the exchange clock and record the local offset.
    pub async fn sync_server_time(&self) -> Result<u64, ProviderError> {
        let response: ApiResponse<TimeResult> = self.get("/v5/market/time", &[]).await?;

        let nanos: u128 = response
            .result
            .time_nano
            .parse()
            .map_err(|_| ProviderError::MissingField("timeNano"))?;
        let server_ms = (nanos / 1_000_000) as u64;

        let local_ms = chrono::Utc::now().timestamp_millis();
        let offset = server_ms as i64 - local_ms;
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        debug!(server_ms, offset_ms = offset, "Server time synced");

        Ok(server_ms)
    }

    /// Current exchange time estimate, local clock plus recorded offset.
    pub fn server_now_ms(&self) -> u64 {
        let local_ms = chrono::Utc::now().timestamp_millis();
        (local_ms + self.time_offset_ms.load(Ordering::Relaxed)).max(0) as u64
    }

    /// Instrument definition for one symbol.
    pub async fn instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, ProviderError> {
        let response: ApiResponse<ListResult<InstrumentInfo>> = self
            .get(
                "/v5/market/instruments-info",
                &[("category", &self.config.category), ("symbol", symbol)],
            )
            .await?;

        response
            .result
            .list
            .into_iter()
            .find(|info| info.symbol == symbol)
            .ok_or_else(|| ProviderError::InstrumentNotFound(symbol.to_string()))
    }

    /// Recent public trades for one symbol, newest first as the exchange
    /// returns them.
    pub async fn recent_trades(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<RecentTrade>, ProviderError> {
        let limit = limit.to_string();
        let response: ApiResponse<ListResult<RecentTrade>> = self
            .get(
                "/v5/market/recent-trade",
                &[
                    ("category", &self.config.category),
                    ("symbol", symbol),
                    ("limit", &limit),
                ],
            )
            .await?;
        Ok(response.result.list)
    }

    /// The manager tracking `symbol`, if any.
    pub fn manager(&self, symbol: &str) -> Option<Arc<MarketDataManager>> {
        self.managers.read().get(symbol).cloned()
    }

    /// Symbols currently tracked.
    pub fn tracked_symbols(&self) -> Vec<String> {
        self.managers.read().keys().cloned().collect()
    }

    /// Start tracking a symbol: fetch its instrument definition, build a
    /// manager and subscribe its trade and order book topics.
    pub async fn track(&self, symbol: &str) -> Result<Arc<MarketDataManager>, ProviderError> {
        if let Some(existing) = self.manager(symbol) {
            return Ok(existing);
        }
        let info = self.instrument_info(symbol).await?;
        self.track_instrument(&info)
    }

    /// Like [`Self::track`] with an already-fetched instrument definition.
    pub fn track_instrument(
        &self,
        info: &InstrumentInfo,
    ) -> Result<Arc<MarketDataManager>, ProviderError> {
        if let Some(existing) = self.manager(&info.symbol) {
            return Ok(existing);
        }

        let metadata = InstrumentMetadata::from_info(info)?;
        let manager = Arc::new(MarketDataManager::new(metadata));

        self.managers
            .write()
            .insert(info.symbol.clone(), Arc::clone(&manager));
        info!(symbol = %info.symbol, "Tracking instrument");

        self.send_stream(op_message("subscribe", &self.symbol_topics(&info.symbol)));
        Ok(manager)
    }

    /// Stop tracking a symbol and unsubscribe its topics.
    pub fn untrack(&self, symbol: &str) {
        if self.managers.write().remove(symbol).is_some() {
            info!(symbol, "Dropped instrument");
            self.send_stream(op_message("unsubscribe", &self.symbol_topics(symbol)));
        }
    }

    fn symbol_topics(&self, symbol: &str) -> Vec<String> {
        vec![
            Topic::trade(symbol).to_string(),
            Topic::orderbook(self.config.depth, symbol).to_string(),
        ]
    }

    fn send_stream(&self, message: String) {
        if let Some(tx) = self.stream.lock().as_ref() {
            let _ = tx.send(message);
        }
    }

    /// Spawn the stream supervisor. Idempotent, later calls are no-ops.
    pub fn connect(self: &Arc<Self>) {
        let mut slot = self.stream.lock();
        if slot.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(tx);
        drop(slot);

        tokio::spawn(supervise_stream(Arc::clone(self), rx));
    }

    fn dispatcher(&self) -> TypedDispatcher {
        let acceptors: Vec<Acceptor> = vec![
            json_acceptor(handle_op_response),
            push_acceptor(Arc::clone(&self.managers)),
        ];
        TypedDispatcher::new(acceptors)
    }
}

/// Run the stream until every client handle is gone, replacing the
/// subscription whenever it goes stale.
async fn supervise_stream(
    client: Arc<BybitClient>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    loop {
        let (stale_tx, mut stale_rx) = mpsc::channel::<()>(1);
        let dispatcher = client.dispatcher();

        let subscription = PersistentSubscription::spawn(
            SubscriptionConfig {
                url: client.config.ws_url.clone(),
                heartbeat_interval: std::time::Duration::from_secs(
                    client.config.heartbeat_secs,
                ),
            },
            client.resolver.clone(),
            Box::new(move |text| dispatcher.dispatch(text)),
            Box::new(move |error| {
                warn!(error = %error, "Stream went stale");
                let _ = stale_tx.try_send(());
            }),
            Box::new(|n| format!(r#"{{"req_id":"{n}","op":"ping"}}"#)),
        );

        // Re-issue every tracked subscription on the fresh connection
        for symbol in client.tracked_symbols() {
            subscription.send(op_message("subscribe", &client.symbol_topics(&symbol)));
        }

        loop {
            tokio::select! {
                message = outbound.recv() => {
                    match message {
                        Some(message) => subscription.send(message),
                        None => return,
                    }
                }
                _ = stale_rx.recv() => {
                    info!("Replacing stale stream subscription");
                    break;
                }
            }
        }
    }
}

fn op_message(op: &str, args: &[String]) -> String {
    json!({"op": op, "args": args}).to_string()
}

fn handle_op_response(ack: OpResponse) {
    match (ack.op.as_str(), ack.success) {
        ("ping", _) => debug!(req_id = ?ack.req_id, "Pong"),
        (op, Some(false)) => {
            warn!(op, ret_msg = ?ack.ret_msg, "Stream operation rejected")
        }
        (op, _) => debug!(op, conn_id = ?ack.conn_id, "Stream operation acknowledged"),
    }
}

/// Acceptor for topic pushes: routes by topic title and symbol to the
/// owning manager.
fn push_acceptor(managers: Managers) -> Acceptor {
    json_acceptor(move |envelope: PushEnvelope| {
        let topic = match Topic::parse(&envelope.topic) {
            Ok(topic) => topic,
            Err(e) => {
                warn!(topic = %envelope.topic, error = %e, "Unroutable push");
                return;
            }
        };
        let Some(symbol) = topic.symbol.as_deref() else {
            warn!(topic = %envelope.topic, "Push without symbol");
            return;
        };
        let Some(manager) = managers.read().get(symbol).cloned() else {
            warn!(symbol, "Push for untracked symbol");
            return;
        };

        match topic.title.as_str() {
            "publicTrade" => {
                match serde_json::from_value::<Vec<TradePush>>(envelope.data) {
                    Ok(trades) => manager.ingest_trades(&envelope.kind, &trades),
                    Err(e) => warn!(symbol, error = %e, "Bad trade payload"),
                }
            }
            "orderbook" => match serde_json::from_value::<OrderBookPush>(envelope.data) {
                Ok(push) => manager.ingest_book(&envelope.kind, &push),
                Err(e) => warn!(symbol, error = %e, "Bad order book payload"),
            },
            other => debug!(topic = other, "Ignoring unknown topic"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_message_shape() {
        let message = op_message(
            "subscribe",
            &["publicTrade.BTCUSDT".to_string(), "orderbook.50.BTCUSDT".to_string()],
        );
        let value: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["args"][1], "orderbook.50.BTCUSDT");
    }

    #[tokio::test]
    async fn test_symbol_topics_follow_configured_depth() {
        let client = BybitClient::new(
            BybitConfig {
                depth: 200,
                ..BybitConfig::default()
            },
            HostResolver::new(),
        );
        assert_eq!(
            client.symbol_topics("ETHUSDT"),
            vec!["publicTrade.ETHUSDT", "orderbook.200.ETHUSDT"]
        );
    }

    #[tokio::test]
    async fn test_push_acceptor_routes_trades() {
        use crate::manager::market::tests_support::btc_manager;

        let managers: Managers = Arc::new(RwLock::new(HashMap::new()));
        let manager = Arc::new(btc_manager());
        managers
            .write()
            .insert("BTCUSDT".to_string(), Arc::clone(&manager));

        let mut acceptor = push_acceptor(Arc::clone(&managers));
        let raw = r#"{
            "topic": "publicTrade.BTCUSDT",
            "type": "snapshot",
            "ts": 1672304486868,
            "data": [{"T": 1672304486865, "s": "BTCUSDT", "S": "Buy",
                      "v": "0.000010", "p": "16578.50",
                      "i": "20f43950-d8dd-5b31-9112-a178eb6023af"}]
        }"#;

        assert!(acceptor(raw));
        manager.with_trades(|cache| assert_eq!(cache.len(), 1));
    }

    #[tokio::test]
    async fn test_push_acceptor_declines_foreign_payload() {
        let managers: Managers = Arc::new(RwLock::new(HashMap::new()));
        let mut acceptor = push_acceptor(managers);
        assert!(!acceptor(r#"{"op":"ping","success":true}"#));
    }

    #[tokio::test]
    async fn test_server_now_starts_at_local_clock() {
        let client = BybitClient::new(BybitConfig::default(), HostResolver::new());
        let before = chrono::Utc::now().timestamp_millis() as u64;
        let now = client.server_now_ms();
        assert!(now >= before);
        assert!(now < before + 1000);
    }
}
