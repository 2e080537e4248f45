//! Exchange market-data feed manager.
//!
//! Connects to an exchange (REST + WebSocket), normalizes trade and order
//! book events into fixed-point domain types, aggregates trades into buoy
//! candles and persists entities to embedded SQLite storage.

pub mod cli;
pub mod config;
pub mod connect;
pub mod manager;
pub mod provider;
pub mod storage;
