//! Per-symbol market data state.
//!
//! One [`MarketDataManager`] owns everything known about a single
//! instrument: its precision metadata, the append-only trade cache and
//! the current order book. Stream pushes arrive as raw wire structs and
//! leave as fixed-point domain values.

use parking_lot::Mutex;
use tracing::{debug, warn};

use feed_common::data::{
    FixedPoint, FixedPointError, OrderBook, PublicTrade, TradeCache, TradeSide,
};

use crate::provider::bybit::types::{InstrumentInfo, OrderBookPush, RecentTrade, TradePush};
use crate::provider::error::ProviderError;

/// Callback fired after a batch of trades lands in the cache.
pub type TradeListener = Box<dyn Fn(&[PublicTrade]) + Send + Sync>;

/// Instrument precision and size limits, derived from the exchange's
/// instrument definition.
#[derive(Debug, Clone)]
pub struct InstrumentMetadata {
    pub symbol: String,
    pub base_coin: String,
    pub quote_coin: String,
    /// Fractional digits of a price
    pub price_scale: u32,
    /// Fractional digits of a base-asset quantity
    pub base_scale: u32,
    /// Fractional digits of a quote-asset amount
    pub quote_scale: u32,
    pub min_order_qty: FixedPoint,
    pub max_order_qty: FixedPoint,
    pub min_order_amt: FixedPoint,
    pub max_order_amt: FixedPoint,
}

impl InstrumentMetadata {
    /// Derive scales and limits from an instrument definition.
    ///
    /// Only instruments in `Trading` status are accepted.
    pub fn from_info(info: &InstrumentInfo) -> Result<Self, ProviderError> {
        if info.status != "Trading" {
            return Err(ProviderError::UnexpectedValue {
                field: "status",
                value: info.status.clone(),
            });
        }

        let price_scale = FixedPoint::precision_of(&info.price_filter.tick_size)?;
        let base_scale = FixedPoint::precision_of(&info.lot_size_filter.base_precision)?;
        let quote_scale = FixedPoint::precision_of(&info.lot_size_filter.quote_precision)?;

        // The exchange quotes size bounds with more fractional digits than
        // the instrument precision; parse each bound at whichever is finer.
        let bound = |value: &str, scale: u32| -> Result<FixedPoint, FixedPointError> {
            let digits = FixedPoint::precision_of(value)?;
            FixedPoint::parse(value, scale.max(digits))
        };

        Ok(Self {
            symbol: info.symbol.clone(),
            base_coin: info.base_coin.clone(),
            quote_coin: info.quote_coin.clone(),
            price_scale,
            base_scale,
            quote_scale,
            min_order_qty: bound(&info.lot_size_filter.min_order_qty, base_scale)?,
            max_order_qty: bound(&info.lot_size_filter.max_order_qty, base_scale)?,
            min_order_amt: bound(&info.lot_size_filter.min_order_amt, quote_scale)?,
            max_order_amt: bound(&info.lot_size_filter.max_order_amt, quote_scale)?,
        })
    }
}

/// All live state for one instrument.
pub struct MarketDataManager {
    metadata: InstrumentMetadata,
    trades: Mutex<TradeCache>,
    book: Mutex<OrderBook>,
    listeners: Mutex<Vec<TradeListener>>,
}

impl MarketDataManager {
    pub fn new(metadata: InstrumentMetadata) -> Self {
        Self {
            metadata,
            trades: Mutex::new(TradeCache::new()),
            book: Mutex::new(OrderBook::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback for newly ingested trade batches.
    pub fn add_trade_listener(&self, listener: impl Fn(&[PublicTrade]) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn metadata(&self) -> &InstrumentMetadata {
        &self.metadata
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    /// Run `f` against the trade cache.
    pub fn with_trades<R>(&self, f: impl FnOnce(&TradeCache) -> R) -> R {
        f(&self.trades.lock())
    }

    /// Run `f` against the order book.
    pub fn with_book<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(&self.book.lock())
    }

    /// Ingest a `publicTrade` push.
    ///
    /// Trade pushes are always snapshots; a payload naming a different
    /// symbol than this instrument is rejected outright.
    pub fn handle_trade_push(
        &self,
        kind: &str,
        trades: &[TradePush],
    ) -> Result<(), ProviderError> {
        if kind != "snapshot" {
            return Err(ProviderError::UnexpectedValue {
                field: "type",
                value: kind.to_string(),
            });
        }

        let mut parsed = Vec::with_capacity(trades.len());
        for trade in trades {
            if let Some(symbol) = &trade.s {
                if symbol != &self.metadata.symbol {
                    return Err(ProviderError::SymbolMismatch {
                        expected: self.metadata.symbol.clone(),
                        actual: symbol.clone(),
                    });
                }
            }
            parsed.push(self.parse_trade(trade)?);
        }

        debug!(symbol = %self.metadata.symbol, count = parsed.len(), "Trades ingested");
        for listener in self.listeners.lock().iter() {
            listener(&parsed);
        }
        self.trades.lock().extend(parsed);
        Ok(())
    }

    /// Normalize a REST recent-trade entry to fixed points. These carry
    /// their symbol explicitly, so a mismatch is always an error.
    pub fn normalize_recent(&self, trade: &RecentTrade) -> Result<PublicTrade, ProviderError> {
        if trade.symbol != self.metadata.symbol {
            return Err(ProviderError::SymbolMismatch {
                expected: self.metadata.symbol.clone(),
                actual: trade.symbol.clone(),
            });
        }
        let side = match trade.side.as_str() {
            "Buy" => TradeSide::Buy,
            "Sell" => TradeSide::Sell,
            other => {
                return Err(ProviderError::UnexpectedValue {
                    field: "side",
                    value: other.to_string(),
                })
            }
        };
        let timestamp_ms: u64 = trade
            .time
            .parse()
            .map_err(|_| ProviderError::MissingField("time"))?;
        let price = FixedPoint::parse(&trade.price, self.metadata.price_scale)?;
        let volume = FixedPoint::parse(&trade.size, self.metadata.base_scale)?;

        Ok(PublicTrade {
            trade_id: trade.exec_id.clone(),
            symbol: self.metadata.symbol.clone(),
            side,
            timestamp_ms,
            price_points: price.points(),
            volume_points: volume.points(),
        })
    }

    fn parse_trade(&self, trade: &TradePush) -> Result<PublicTrade, ProviderError> {
        if trade.i.is_empty() {
            return Err(ProviderError::MissingField("i"));
        }
        let side = match trade.side.as_str() {
            "Buy" => TradeSide::Buy,
            "Sell" => TradeSide::Sell,
            other => {
                return Err(ProviderError::UnexpectedValue {
                    field: "S",
                    value: other.to_string(),
                })
            }
        };
        let price = FixedPoint::parse(&trade.p, self.metadata.price_scale)?;
        let volume = FixedPoint::parse(&trade.v, self.metadata.base_scale)?;

        Ok(PublicTrade {
            trade_id: trade.i.clone(),
            symbol: self.metadata.symbol.clone(),
            side,
            timestamp_ms: trade.ts,
            price_points: price.points(),
            volume_points: volume.points(),
        })
    }

    /// Ingest an `orderbook` push. Snapshots replace both sides, deltas
    /// patch them with zero-size levels meaning removal.
    pub fn handle_book_push(
        &self,
        kind: &str,
        push: &OrderBookPush,
    ) -> Result<(), ProviderError> {
        if push.s != self.metadata.symbol {
            return Err(ProviderError::SymbolMismatch {
                expected: self.metadata.symbol.clone(),
                actual: push.s.clone(),
            });
        }

        let bids = self.parse_levels(&push.b)?;
        let asks = self.parse_levels(&push.a)?;

        let mut book = self.book.lock();
        match kind {
            "snapshot" => book.apply_snapshot(&bids, &asks),
            "delta" => book.apply_delta(&bids, &asks),
            other => {
                return Err(ProviderError::UnexpectedValue {
                    field: "type",
                    value: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn parse_levels(&self, levels: &[[String; 2]]) -> Result<Vec<(u64, u64)>, ProviderError> {
        levels
            .iter()
            .map(|[price, size]| {
                let price = FixedPoint::parse(price, self.metadata.price_scale)?;
                let size = FixedPoint::parse(size, self.metadata.base_scale)?;
                Ok((price.points(), size.points()))
            })
            .collect()
    }

    /// Warn-and-continue wrapper used at the dispatch boundary, where a
    /// single bad payload must not tear down the stream.
    pub fn ingest_trades(&self, kind: &str, trades: &[TradePush]) {
        if let Err(e) = self.handle_trade_push(kind, trades) {
            warn!(symbol = %self.metadata.symbol, error = %e, "Trade push rejected");
        }
    }

    /// See [`Self::ingest_trades`].
    pub fn ingest_book(&self, kind: &str, push: &OrderBookPush) {
        if let Err(e) = self.handle_book_push(kind, push) {
            warn!(symbol = %self.metadata.symbol, error = %e, "Order book push rejected");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    use crate::provider::bybit::types::{LotSizeFilter, PriceFilter};

    /// BTCUSDT manager with price scale 2 and base scale 6.
    pub(crate) fn btc_manager() -> MarketDataManager {
        MarketDataManager::new(InstrumentMetadata::from_info(&btc_info()).unwrap())
    }

    pub(crate) fn btc_info() -> InstrumentInfo {
        InstrumentInfo {
            symbol: "BTCUSDT".to_string(),
            base_coin: "BTC".to_string(),
            quote_coin: "USDT".to_string(),
            status: "Trading".to_string(),
            price_filter: PriceFilter {
                tick_size: "0.01".to_string(),
            },
            lot_size_filter: LotSizeFilter {
                base_precision: "0.000001".to_string(),
                quote_precision: "0.00000001".to_string(),
                min_order_qty: "0.000048".to_string(),
                max_order_qty: "71.73956243".to_string(),
                min_order_amt: "1".to_string(),
                max_order_amt: "2000000".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::tests_support::btc_info;

    fn manager() -> MarketDataManager {
        MarketDataManager::new(InstrumentMetadata::from_info(&btc_info()).unwrap())
    }

    fn trade(id: &str, side: &str, ts: u64, p: &str, v: &str) -> TradePush {
        TradePush {
            i: id.to_string(),
            side: side.to_string(),
            ts,
            p: p.to_string(),
            v: v.to_string(),
            s: None,
        }
    }

    #[test]
    fn test_metadata_scales_from_precision_specs() {
        let meta = InstrumentMetadata::from_info(&btc_info()).unwrap();
        assert_eq!(meta.price_scale, 2);
        assert_eq!(meta.base_scale, 6);
        assert_eq!(meta.quote_scale, 8);
        assert_eq!(meta.min_order_qty.points(), 48);
        assert_eq!(meta.min_order_amt.points(), 100_000_000);
    }

    #[test]
    fn test_metadata_bounds_finer_than_instrument_precision() {
        // maxOrderQty carries eight fractional digits against a six-digit
        // basePrecision, as Bybit's own spot listings do
        let meta = InstrumentMetadata::from_info(&btc_info()).unwrap();
        assert_eq!(meta.max_order_qty.decimals(), 8);
        assert_eq!(meta.max_order_qty.points(), 7_173_956_243);
        assert_eq!(meta.max_order_amt.points(), 200_000_000_000_000);
        assert!(meta.min_order_qty < meta.max_order_qty);
    }

    #[test]
    fn test_non_trading_instrument_rejected() {
        let mut info = btc_info();
        info.status = "PreLaunch".to_string();
        assert!(matches!(
            InstrumentMetadata::from_info(&info),
            Err(ProviderError::UnexpectedValue { field: "status", .. })
        ));
    }

    #[test]
    fn test_trade_push_lands_in_cache() {
        let manager = manager();
        manager
            .handle_trade_push(
                "snapshot",
                &[
                    trade("t1", "Buy", 1000, "16578.50", "0.001"),
                    trade("t2", "Sell", 1001, "16578.49", "0.002"),
                ],
            )
            .unwrap();

        manager.with_trades(|cache| {
            assert_eq!(cache.len(), 2);
            let last = cache.last().unwrap();
            assert_eq!(last.trade_id, "t2");
            assert_eq!(last.side, TradeSide::Sell);
            assert_eq!(last.price_points, 1_657_849);
            assert_eq!(last.volume_points, 2_000);
        });
    }

    #[test]
    fn test_trade_push_symbol_mismatch() {
        let manager = manager();
        let mut t = trade("t1", "Buy", 1000, "100.00", "0.001");
        t.s = Some("ETHUSDT".to_string());
        let err = manager.handle_trade_push("snapshot", &[t]).unwrap_err();
        assert!(matches!(err, ProviderError::SymbolMismatch { .. }));
        manager.with_trades(|cache| assert!(cache.is_empty()));
    }

    #[test]
    fn test_trade_push_rejects_non_snapshot() {
        let manager = manager();
        let err = manager
            .handle_trade_push("delta", &[trade("t1", "Buy", 1000, "100.00", "0.001")])
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::UnexpectedValue { field: "type", .. }
        ));
    }

    #[test]
    fn test_trade_push_rejects_unknown_side() {
        let manager = manager();
        let err = manager
            .handle_trade_push("snapshot", &[trade("t1", "Hold", 1000, "100.00", "0.001")])
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::UnexpectedValue { field: "S", .. }
        ));
    }

    #[test]
    fn test_book_snapshot_then_delta() {
        let manager = manager();
        let snapshot = OrderBookPush {
            s: "BTCUSDT".to_string(),
            b: vec![
                ["30247.20".to_string(), "30.028".to_string()],
                ["30245.40".to_string(), "0.1".to_string()],
            ],
            a: vec![["30248.70".to_string(), "0.555".to_string()]],
            u: 1,
            seq: 1,
        };
        manager.handle_book_push("snapshot", &snapshot).unwrap();

        manager.with_book(|book| {
            assert_eq!(book.best_bid(), Some((3_024_720, 30_028_000)));
            assert_eq!(book.best_ask(), Some((3_024_870, 555_000)));
        });

        let delta = OrderBookPush {
            s: "BTCUSDT".to_string(),
            b: vec![["30247.20".to_string(), "0".to_string()]],
            a: vec![],
            u: 2,
            seq: 2,
        };
        manager.handle_book_push("delta", &delta).unwrap();

        manager.with_book(|book| {
            assert_eq!(book.best_bid(), Some((3_024_540, 100_000)));
        });
    }

    #[test]
    fn test_trade_listener_sees_batch() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let manager = manager();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        manager.add_trade_listener(move |batch| {
            counter.fetch_add(batch.len(), Ordering::SeqCst);
        });

        manager
            .handle_trade_push(
                "snapshot",
                &[
                    trade("t1", "Buy", 1000, "100.00", "0.001"),
                    trade("t2", "Sell", 1001, "100.00", "0.001"),
                ],
            )
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_normalize_recent_trade() {
        let manager = manager();
        let recent = RecentTrade {
            exec_id: "2100000000007764263".to_string(),
            symbol: "BTCUSDT".to_string(),
            price: "16618.49".to_string(),
            size: "0.000300".to_string(),
            side: "Buy".to_string(),
            time: "1672052955758".to_string(),
        };

        let trade = manager.normalize_recent(&recent).unwrap();
        assert_eq!(trade.trade_id, "2100000000007764263");
        assert_eq!(trade.price_points, 1_661_849);
        assert_eq!(trade.volume_points, 300);
        assert_eq!(trade.timestamp_ms, 1672052955758);

        let mut foreign = recent.clone();
        foreign.symbol = "ETHUSDT".to_string();
        assert!(matches!(
            manager.normalize_recent(&foreign),
            Err(ProviderError::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn test_book_push_symbol_mismatch() {
        let manager = manager();
        let push = OrderBookPush {
            s: "ETHUSDT".to_string(),
            b: vec![],
            a: vec![],
            u: 1,
            seq: 1,
        };
        assert!(matches!(
            manager.handle_book_push("snapshot", &push),
            Err(ProviderError::SymbolMismatch { .. })
        ));
    }
}
