//! Persisted entity definitions.

use chrono::Utc;

use feed_common::data::PublicTrade;

use crate::provider::bybit::types::InstrumentInfo;
use crate::provider::error::ProviderError;

crate::entity! {
    /// A tracked instrument. The full exchange definition rides along as
    /// JSON so scale changes can be detected on restart.
    pub struct InstrumentRecord {
        table = "instruments";
        pk = [provider, symbol];
        provider: String,
        symbol: String,
        base_coin: String,
        quote_coin: String,
        metadata: String,
        updated_at: i64,
    }
}

crate::entity! {
    /// One executed public trade.
    pub struct TradeRecord {
        table = "trade_records";
        pk = [provider, symbol, trade_id];
        provider: String,
        symbol: String,
        trade_id: String,
        side: String,
        price_points: i64,
        volume_points: i64,
        executed_at_ms: i64,
    }
}

impl InstrumentRecord {
    /// Snapshot an exchange instrument definition.
    pub fn from_info(provider: &str, info: &InstrumentInfo) -> Result<Self, ProviderError> {
        let metadata = serde_json::to_string(&serde_json::json!({
            "status": info.status,
            "tickSize": info.price_filter.tick_size,
            "basePrecision": info.lot_size_filter.base_precision,
            "quotePrecision": info.lot_size_filter.quote_precision,
            "minOrderQty": info.lot_size_filter.min_order_qty,
            "maxOrderQty": info.lot_size_filter.max_order_qty,
            "minOrderAmt": info.lot_size_filter.min_order_amt,
            "maxOrderAmt": info.lot_size_filter.max_order_amt,
        }))?;

        Ok(Self {
            provider: provider.to_string(),
            symbol: info.symbol.clone(),
            base_coin: info.base_coin.clone(),
            quote_coin: info.quote_coin.clone(),
            metadata,
            updated_at: Utc::now().timestamp(),
        })
    }

    /// Whether the stored definition differs from this one, ignoring the
    /// write timestamp.
    pub fn differs_from(&self, other: &Self) -> bool {
        self.base_coin != other.base_coin
            || self.quote_coin != other.quote_coin
            || self.metadata != other.metadata
    }
}

impl TradeRecord {
    pub fn from_trade(provider: &str, trade: &PublicTrade) -> Self {
        Self {
            provider: provider.to_string(),
            symbol: trade.symbol.clone(),
            trade_id: trade.trade_id.clone(),
            side: trade.side.as_db_str().to_string(),
            price_points: trade.price_points as i64,
            volume_points: trade.volume_points as i64,
            executed_at_ms: trade.timestamp_ms as i64,
        }
    }
}
