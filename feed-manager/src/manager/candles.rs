//! Candle view over a trade cache.
//!
//! A [`CandleView`] is a reader-side cursor: each refresh pulls only the
//! trades it has not seen yet and folds them into its aggregator, so the
//! cost of a refresh is proportional to new trades, not cache size.
//! Several views with different bucket widths can share one manager.

use std::sync::Arc;

use feed_common::candles::{BuoyCandle, BuoyCandleAggregator};
use feed_common::error::CandleError;

use super::market::MarketDataManager;

pub struct CandleView {
    manager: Arc<MarketDataManager>,
    aggregator: BuoyCandleAggregator,
    cursor: usize,
    carry_price: Option<u64>,
}

impl CandleView {
    /// Create a view with a fixed bucket width in milliseconds.
    pub fn new(manager: Arc<MarketDataManager>, buoy_duration_ms: u64) -> Self {
        Self {
            manager,
            aggregator: BuoyCandleAggregator::new(buoy_duration_ms),
            cursor: 0,
            carry_price: None,
        }
    }

    pub fn buoy_duration_ms(&self) -> u64 {
        self.aggregator.buoy_duration_ms()
    }

    /// Sealed buckets, oldest first.
    pub fn sealed(&self) -> impl Iterator<Item = &BuoyCandle> {
        self.aggregator.sealed().iter()
    }

    /// The in-progress bucket.
    pub fn active(&self) -> BuoyCandle {
        self.aggregator.active()
    }

    /// Fold all unseen trades into the aggregator and advance the wall
    /// clock to `now_ms`.
    pub fn refresh(&mut self, now_ms: u64) -> Result<(), CandleError> {
        // Borrow the cache only long enough to copy the unseen tail
        let (batch, cache_len) = self.manager.with_trades(|cache| {
            (cache.since(self.cursor).to_vec(), cache.len())
        });

        // Before any price is known, seed from the first trade itself so
        // the carry does not distort the opening bucket
        let carry = self
            .carry_price
            .or_else(|| batch.first().map(|t| t.price_points));

        if let Some(carry) = carry {
            let last = self.aggregator.append_trades(&batch, now_ms, carry)?;
            self.carry_price = Some(last);
        }

        self.cursor = cache_len;
        Ok(())
    }

    /// Forget all candle state and skip past every cached trade. The next
    /// refresh re-anchors the bucket grid on fresh trades.
    pub fn reset(&mut self) {
        self.aggregator.reset();
        self.carry_price = None;
        self.cursor = self.manager.with_trades(|cache| cache.len());
    }
}
