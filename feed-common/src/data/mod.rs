//! Core market-data types.

pub mod fixed;
pub mod orderbook;
pub mod trade;

pub use fixed::{FixedPoint, FixedPointError};
pub use orderbook::OrderBook;
pub use trade::{PublicTrade, TradeCache, TradeSide};
