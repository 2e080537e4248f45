//! Bybit v5 wire types.
//!
//! REST responses share the `{retCode, retMsg, result, time}` envelope;
//! stream pushes share `{topic, type, ts, data}`. Numeric quantities are
//! decimal strings on the wire and stay strings here, conversion to
//! fixed-point happens against per-instrument scales in the manager.

use serde::Deserialize;

/// REST response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub ret_code: i64,
    pub ret_msg: String,
    pub result: T,
    #[serde(default)]
    pub time: u64,
}

/// `/v5/market/time` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeResult {
    pub time_second: String,
    pub time_nano: String,
}

/// Paged list container used by instruments-info and recent-trade.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub category: String,
    pub list: Vec<T>,
    #[serde(default)]
    pub next_page_cursor: Option<String>,
}

/// `/v5/market/instruments-info` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentInfo {
    pub symbol: String,
    pub base_coin: String,
    pub quote_coin: String,
    pub status: String,
    pub price_filter: PriceFilter,
    pub lot_size_filter: LotSizeFilter,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFilter {
    pub tick_size: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotSizeFilter {
    pub base_precision: String,
    pub quote_precision: String,
    pub min_order_qty: String,
    pub max_order_qty: String,
    pub min_order_amt: String,
    pub max_order_amt: String,
}

/// `/v5/market/recent-trade` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTrade {
    pub exec_id: String,
    pub symbol: String,
    pub price: String,
    pub size: String,
    pub side: String,
    pub time: String,
}

/// Stream push envelope. The payload stays raw until the topic routes it.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: u64,
    pub data: serde_json::Value,
}

/// One trade inside a `publicTrade` push.
#[derive(Debug, Clone, Deserialize)]
pub struct TradePush {
    /// Trade id
    pub i: String,
    /// Taker side, "Buy" or "Sell"
    #[serde(rename = "S")]
    pub side: String,
    /// Trade time, epoch milliseconds
    #[serde(rename = "T")]
    pub ts: u64,
    /// Price, decimal string
    pub p: String,
    /// Volume, decimal string
    pub v: String,
    /// Symbol, present on some push variants
    #[serde(default)]
    pub s: Option<String>,
}

/// `orderbook` push payload. Levels are `[price, size]` string pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookPush {
    /// Symbol
    pub s: String,
    /// Bid levels
    pub b: Vec<[String; 2]>,
    /// Ask levels
    pub a: Vec<[String; 2]>,
    /// Update id
    #[serde(default)]
    pub u: u64,
    /// Cross-sequence
    #[serde(default)]
    pub seq: u64,
}

/// Acknowledgement for `subscribe`/`unsubscribe`/`ping` operations.
#[derive(Debug, Deserialize)]
pub struct OpResponse {
    pub op: String,
    #[serde(default)]
    pub req_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub ret_msg: Option<String>,
    #[serde(default)]
    pub conn_id: Option<String>,
}
