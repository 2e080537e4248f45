//! Public trade types and the append-only trade cache.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Trade side (aggressor side for public trades).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Database-friendly string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// A single public trade, already normalized to fixed points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicTrade {
    /// Exchange-assigned execution id
    pub trade_id: String,
    /// Instrument symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Aggressor side
    pub side: TradeSide,
    /// Execution time, milliseconds since epoch
    pub timestamp_ms: u64,
    /// Price in instrument price points
    pub price_points: u64,
    /// Size in instrument volume points
    pub volume_points: u64,
}

impl PublicTrade {
    /// Execution time as a UTC datetime.
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms as i64)
            .single()
            .unwrap_or_default()
    }
}

/// Append-only trade cache.
///
/// Trades arrive in wire order from the stream handler and are only ever
/// appended; readers track their own position and pull slices of unseen
/// trades. Eviction is out of scope for now, the interface keeps indices
/// stable within one session.
#[derive(Debug, Default)]
pub struct TradeCache {
    trades: Vec<PublicTrade>,
}

impl TradeCache {
    pub fn new() -> Self {
        Self { trades: Vec::new() }
    }

    /// Append a trade at the end of the cache.
    pub fn append(&mut self, trade: PublicTrade) {
        self.trades.push(trade);
    }

    /// Append a batch, preserving order.
    pub fn extend(&mut self, trades: impl IntoIterator<Item = PublicTrade>) {
        self.trades.extend(trades);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// The most recently appended trade.
    pub fn last(&self) -> Option<&PublicTrade> {
        self.trades.last()
    }

    /// Trades appended at or after `index`.
    pub fn since(&self, index: usize) -> &[PublicTrade] {
        &self.trades[index.min(self.trades.len())..]
    }

    /// All cached trades in arrival order.
    pub fn all(&self) -> &[PublicTrade] {
        &self.trades
    }
}
