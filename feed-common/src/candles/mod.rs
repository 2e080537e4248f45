//! Buoy-candle aggregation.
//!
//! Converts an ordered trade sequence into fixed-width time buckets
//! incrementally. Cost per call is O(new trades + elapsed empty buckets),
//! never O(total history), which is what makes per-paint refreshes viable.

use std::collections::VecDeque;

use crate::data::trade::PublicTrade;
use crate::error::CandleError;

/// Anything the aggregator can fold into a bucket.
pub trait TradePoint {
    /// Execution time, milliseconds since epoch
    fn timestamp_ms(&self) -> u64;
    /// Price in fixed points
    fn price_points(&self) -> u64;
    /// Size in fixed points
    fn volume_points(&self) -> u64;
}

impl TradePoint for PublicTrade {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    fn price_points(&self) -> u64 {
        self.price_points
    }

    fn volume_points(&self) -> u64 {
        self.volume_points
    }
}

/// One fixed-width bucket of trades.
///
/// `mean` is the volume-weighted average price of the trades folded into
/// this bucket. An empty (forward-filled) bucket is flat at the carried
/// price with zero volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuoyCandle {
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub volume: u64,
}

impl BuoyCandle {
    /// A fresh bucket seeded at `price` with no volume.
    fn seeded(price: u64) -> Self {
        Self {
            min: price,
            max: price,
            mean: price,
            volume: 0,
        }
    }

    /// Fold one trade into the bucket.
    fn fold(&mut self, price: u64, volume: u64) {
        let last_volume = self.volume;
        let sum_volume = last_volume + volume;

        self.max = self.max.max(price);
        self.min = self.min.min(price);
        // A zero-size trade widens the range but carries no weight
        if sum_volume > 0 {
            self.mean = ((self.mean as u128 * last_volume as u128
                + price as u128 * volume as u128)
                / sum_volume as u128) as u64;
        }
        self.volume = sum_volume;
    }
}

/// Incremental fixed-bucket trade aggregator.
///
/// Trades must arrive in non-decreasing timestamp order across calls;
/// violations are reported as [`CandleError`], never silently corrected.
#[derive(Debug)]
pub struct BuoyCandleAggregator {
    buoy_duration_ms: u64,
    first_buoy_ts: Option<u64>,
    first_trade_ts: Option<u64>,
    last_trade_ts: Option<u64>,
    sealed: VecDeque<BuoyCandle>,
    active: BuoyCandle,
}

impl BuoyCandleAggregator {
    /// Create an aggregator with a fixed bucket width in milliseconds.
    pub fn new(buoy_duration_ms: u64) -> Self {
        assert!(buoy_duration_ms > 0, "bucket duration must be positive");
        Self {
            buoy_duration_ms,
            first_buoy_ts: None,
            first_trade_ts: None,
            last_trade_ts: None,
            sealed: VecDeque::new(),
            active: BuoyCandle::seeded(0),
        }
    }

    pub fn buoy_duration_ms(&self) -> u64 {
        self.buoy_duration_ms
    }

    /// Timestamp of the first bucket's left edge, once the grid is anchored.
    pub fn first_buoy_ts(&self) -> Option<u64> {
        self.first_buoy_ts
    }

    pub fn first_trade_ts(&self) -> Option<u64> {
        self.first_trade_ts
    }

    pub fn last_trade_ts(&self) -> Option<u64> {
        self.last_trade_ts
    }

    /// Sealed buckets, oldest first.
    pub fn sealed(&self) -> &VecDeque<BuoyCandle> {
        &self.sealed
    }

    /// The in-progress bucket.
    pub fn active(&self) -> BuoyCandle {
        self.active
    }

    /// Drop the grid anchor; the next append reinitializes from scratch.
    pub fn reset(&mut self) {
        self.first_buoy_ts = None;
    }

    /// Append a batch of ordered trades and advance the wall clock.
    ///
    /// `carry_price` threads price continuity across calls: it seeds the
    /// active bucket on (re)initialization and backfills empty buckets.
    /// Returns the last observed trade price, or `carry_price` when the
    /// batch is empty.
    pub fn append_trades<T: TradePoint>(
        &mut self,
        trades: &[T],
        now_ms: u64,
        carry_price: u64,
    ) -> Result<u64, CandleError> {
        let mut last_price = carry_price;

        if let Some(first) = trades.first() {
            let first_ts = first.timestamp_ms();

            if self.first_buoy_ts.is_none() {
                self.active = BuoyCandle::seeded(last_price);
                self.sealed.clear();
                self.first_trade_ts = Some(first_ts);
                self.first_buoy_ts = Some(first_ts - first_ts % self.buoy_duration_ms);
                self.last_trade_ts = None;
            }

            let first_buoy_ts = self.first_buoy_ts.unwrap_or(0);

            if !self.sealed.is_empty() {
                let last_sealed_start =
                    first_buoy_ts + (self.sealed.len() as u64 - 1) * self.buoy_duration_ms;
                if first_ts < last_sealed_start {
                    return Err(CandleError::TradeBeforeSealed {
                        trade_ts: first_ts,
                        sealed_start: last_sealed_start,
                    });
                }
            }

            if let Some(last_ts) = self.last_trade_ts {
                if first_ts < last_ts {
                    return Err(CandleError::TradeBeforeLast {
                        trade_ts: first_ts,
                        last_ts,
                    });
                }
            }

            // The active bucket always has index sealed.len(); its right
            // edge is where the next seal happens.
            let mut next_buoy_ts =
                first_buoy_ts + (self.sealed.len() as u64 + 1) * self.buoy_duration_ms;
            let mut trade_ts = 0;

            for trade in trades {
                trade_ts = trade.timestamp_ms();

                while trade_ts >= next_buoy_ts {
                    let buoy = self.active;
                    self.active = BuoyCandle::seeded(last_price);
                    self.sealed.push_back(buoy);
                    next_buoy_ts += self.buoy_duration_ms;
                }

                self.active
                    .fold(trade.price_points(), trade.volume_points());
                last_price = trade.price_points();
            }

            self.last_trade_ts = Some(trade_ts);
        }

        if let Some(first_buoy_ts) = self.first_buoy_ts {
            let active_buoy_ts = now_ms - now_ms % self.buoy_duration_ms;
            let mut next_buoy_ts =
                first_buoy_ts + (self.sealed.len() as u64 + 1) * self.buoy_duration_ms;

            // Forward-fill empty buckets up to (not including) the bucket
            // containing `now_ms`.
            while active_buoy_ts >= next_buoy_ts {
                let buoy = self.active;
                self.active = BuoyCandle::seeded(last_price);
                self.sealed.push_back(buoy);
                next_buoy_ts += self.buoy_duration_ms;
            }
        }

        Ok(last_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::trade::TradeSide;

    fn trade(ts: u64, price: u64, volume: u64) -> PublicTrade {
        PublicTrade {
            trade_id: format!("{ts}-{price}"),
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Buy,
            timestamp_ms: ts,
            price_points: price,
            volume_points: volume,
        }
    }

    #[test]
    fn test_flat_sequence_two_buckets() {
        let mut agg = BuoyCandleAggregator::new(1000);
        let trades = [trade(0, 100, 10), trade(1000, 100, 10), trade(2000, 1000, 100)];

        let last = agg.append_trades(&trades, 2000, 100).unwrap();
        assert_eq!(last, 1000);

        assert_eq!(agg.sealed().len(), 2);
        for buoy in agg.sealed() {
            assert_eq!(
                *buoy,
                BuoyCandle {
                    min: 100,
                    max: 100,
                    mean: 100,
                    volume: 10
                }
            );
        }
        // The t=2000 trade lives in the active bucket
        assert_eq!(agg.active().volume, 100);
        assert_eq!(agg.active().max, 1000);
    }

    #[test]
    fn test_second_bucket_mean_reflects_only_its_trades() {
        let mut agg = BuoyCandleAggregator::new(1000);
        let trades = [trade(0, 100, 10), trade(1000, 200, 10), trade(2000, 1000, 100)];

        agg.append_trades(&trades, 2000, 100).unwrap();

        assert_eq!(agg.sealed().len(), 2);
        assert_eq!(
            agg.sealed()[0],
            BuoyCandle {
                min: 100,
                max: 100,
                mean: 100,
                volume: 10
            }
        );
        // Seeded at the previous price 100, then one trade at 200
        assert_eq!(
            agg.sealed()[1],
            BuoyCandle {
                min: 100,
                max: 200,
                mean: 200,
                volume: 10
            }
        );
    }

    #[test]
    fn test_volume_weighted_mean() {
        let mut agg = BuoyCandleAggregator::new(1000);
        let trades = [trade(0, 100, 30), trade(10, 200, 10)];

        agg.append_trades(&trades, 0, 100).unwrap();

        // (100*30 + 200*10) / 40 = 125
        let active = agg.active();
        assert_eq!(active.mean, 125);
        assert_eq!(active.min, 100);
        assert_eq!(active.max, 200);
        assert_eq!(active.volume, 40);
    }

    #[test]
    fn test_zero_volume_trade_widens_range_not_mean() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(0, 100, 0)], 0, 100).unwrap();

        let active = agg.active();
        assert_eq!(active.volume, 0);
        assert_eq!(active.mean, 100);

        agg.append_trades(&[trade(10, 200, 0), trade(20, 150, 10)], 20, 100)
            .unwrap();
        let active = agg.active();
        assert_eq!(active.max, 200);
        assert_eq!(active.mean, 150);
        assert_eq!(active.volume, 10);
    }

    #[test]
    fn test_bucket_invariant_min_le_mean_le_max() {
        let mut agg = BuoyCandleAggregator::new(100);
        let trades: Vec<PublicTrade> = (0..50)
            .map(|i| trade(i * 37, 100 + (i * 13) % 57, 1 + i % 7))
            .collect();

        agg.append_trades(&trades, 2000, 100).unwrap();

        for buoy in agg.sealed() {
            assert!(buoy.min <= buoy.mean, "min {} > mean {}", buoy.min, buoy.mean);
            assert!(buoy.mean <= buoy.max, "mean {} > max {}", buoy.mean, buoy.max);
        }
    }

    #[test]
    fn test_forward_fill_exactly_one_empty_bucket() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(0, 100, 10), trade(1000, 100, 10)], 2000, 100)
            .unwrap();
        // [0,1000) and [1000,2000) sealed, empty active at [2000,3000)
        let sealed_before = agg.sealed().len();
        assert_eq!(sealed_before, 2);

        // No trades, wall clock two bucket-widths past the last sealed start
        let last = agg
            .append_trades(&[] as &[PublicTrade], 3000, 100)
            .unwrap();
        assert_eq!(last, 100);

        assert_eq!(agg.sealed().len(), sealed_before + 1);
        let filled = agg.sealed().back().unwrap();
        assert_eq!(
            *filled,
            BuoyCandle {
                min: 100,
                max: 100,
                mean: 100,
                volume: 0
            }
        );
        // Active advanced to the bucket containing `now`
        assert_eq!(agg.active().volume, 0);
    }

    #[test]
    fn test_empty_only_forward_fill_is_flat() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(100, 250, 5)], 100, 250).unwrap();

        agg.append_trades(&[] as &[PublicTrade], 4000, 250).unwrap();

        // Buckets [0,1000) through [3000,4000) sealed, [4000,5000) active
        assert_eq!(agg.sealed().len(), 4);
        assert_eq!(agg.sealed()[0].volume, 5);
        for buoy in agg.sealed().iter().skip(1) {
            assert_eq!(
                *buoy,
                BuoyCandle {
                    min: 250,
                    max: 250,
                    mean: 250,
                    volume: 0
                }
            );
        }
    }

    #[test]
    fn test_ordering_violation_against_last_trade() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(0, 100, 10), trade(500, 100, 10)], 500, 100)
            .unwrap();

        let err = agg
            .append_trades(&[trade(400, 100, 10)], 600, 100)
            .unwrap_err();
        assert_eq!(
            err,
            CandleError::TradeBeforeLast {
                trade_ts: 400,
                last_ts: 500
            }
        );
    }

    #[test]
    fn test_ordering_violation_against_sealed_bucket() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(0, 100, 10)], 3500, 100).unwrap();
        assert!(agg.sealed().len() >= 2);

        let err = agg
            .append_trades(&[trade(100, 100, 10)], 3600, 100)
            .unwrap_err();
        assert!(matches!(err, CandleError::TradeBeforeSealed { .. }));
    }

    #[test]
    fn test_reset_reanchors_grid() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(0, 100, 10)], 2500, 100).unwrap();
        assert!(!agg.sealed().is_empty());

        agg.reset();
        assert!(agg.first_buoy_ts().is_none());

        // A trade "before" the old grid is fine after reset
        agg.append_trades(&[trade(5300, 70, 1)], 5300, 70).unwrap();
        assert_eq!(agg.first_buoy_ts(), Some(5000));
        assert!(agg.sealed().is_empty());
        assert_eq!(agg.active().volume, 1);
    }

    #[test]
    fn test_empty_call_before_anchor_is_noop() {
        let mut agg = BuoyCandleAggregator::new(1000);
        let last = agg.append_trades(&[] as &[PublicTrade], 99_000, 42).unwrap();
        assert_eq!(last, 42);
        assert!(agg.first_buoy_ts().is_none());
        assert!(agg.sealed().is_empty());
    }

    #[test]
    fn test_grid_anchor_floors_first_trade() {
        let mut agg = BuoyCandleAggregator::new(1000);
        agg.append_trades(&[trade(1750, 100, 1)], 1750, 100).unwrap();
        assert_eq!(agg.first_buoy_ts(), Some(1000));
        assert_eq!(agg.first_trade_ts(), Some(1750));
    }

    #[test]
    fn test_incremental_calls_accumulate() {
        let mut agg = BuoyCandleAggregator::new(1000);
        let mut carry = 100;
        carry = agg.append_trades(&[trade(0, 100, 10)], 0, carry).unwrap();
        carry = agg.append_trades(&[trade(900, 150, 10)], 900, carry).unwrap();
        carry = agg
            .append_trades(&[trade(1100, 300, 10)], 1100, carry)
            .unwrap();
        assert_eq!(carry, 300);

        assert_eq!(agg.sealed().len(), 1);
        let first = agg.sealed()[0];
        assert_eq!(first.min, 100);
        assert_eq!(first.max, 150);
        assert_eq!(first.volume, 20);
        assert_eq!(first.mean, 125);
    }
}
