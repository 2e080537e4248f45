//! Price-level order book.
//!
//! Levels are keyed by price points. Snapshots replace the whole side,
//! deltas patch individual levels and a zero size removes the level.
//! Bids and asks live in separate containers.

use std::collections::BTreeMap;

/// One side patch entry: `(price_points, size_points)`.
pub type Level = (u64, u64);

/// Order book for a single instrument, in fixed points.
#[derive(Debug, Default, Clone)]
pub struct OrderBook {
    bids: BTreeMap<u64, u64>,
    asks: BTreeMap<u64, u64>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both sides with a full snapshot.
    pub fn apply_snapshot(&mut self, bids: &[Level], asks: &[Level]) {
        self.bids = bids.iter().copied().collect();
        self.asks = asks.iter().copied().collect();
    }

    /// Apply an incremental update. Zero size deletes the level.
    pub fn apply_delta(&mut self, bids: &[Level], asks: &[Level]) {
        Self::patch(&mut self.bids, bids);
        Self::patch(&mut self.asks, asks);
    }

    fn patch(side: &mut BTreeMap<u64, u64>, levels: &[Level]) {
        for &(price, size) in levels {
            if size == 0 {
                side.remove(&price);
            } else {
                side.insert(price, size);
            }
        }
    }

    /// Highest bid level, if any.
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    /// Lowest ask level, if any.
    pub fn best_ask(&self) -> Option<Level> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }

    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Bids from best (highest) downward.
    pub fn bids(&self) -> impl Iterator<Item = Level> + '_ {
        self.bids.iter().rev().map(|(&p, &s)| (p, s))
    }

    /// Asks from best (lowest) upward.
    pub fn asks(&self) -> impl Iterator<Item = Level> + '_ {
        self.asks.iter().map(|(&p, &s)| (p, s))
    }
}
