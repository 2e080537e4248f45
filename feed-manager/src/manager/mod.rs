//! Per-symbol market state.

pub mod candles;
pub mod market;

pub use candles::CandleView;
pub use market::{InstrumentMetadata, MarketDataManager, TradeListener};
