//! Bybit spot market-data provider.
//!
//! REST endpoints under `/v5/market/` supply server time, instrument
//! definitions and trade history; the public spot WebSocket pushes
//! `publicTrade` and `orderbook` topics.

pub mod client;
pub mod topic;
pub mod types;

pub use client::{BybitClient, BybitConfig};
pub use topic::Topic;
