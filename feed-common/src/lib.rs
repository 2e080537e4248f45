//! Shared building blocks for the market-data feed.
//!
//! This crate holds everything that is independent of a concrete exchange:
//! fixed-point prices, trade and order book types, the buoy-candle
//! aggregation engine, the typed message dispatcher, error classification
//! and logging setup.

pub mod candles;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod logging;

pub use candles::{BuoyCandle, BuoyCandleAggregator};
pub use data::fixed::FixedPoint;
pub use data::orderbook::OrderBook;
pub use data::trade::{PublicTrade, TradeCache, TradeSide};
pub use dispatch::TypedDispatcher;
pub use error::{CandleError, ErrorCategory, ErrorClassification};
