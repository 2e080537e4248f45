//! Database facade.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use feed_common::data::PublicTrade;

use crate::provider::bybit::types::InstrumentInfo;

use super::condition::Condition;
use super::entity::StorageError;
use super::records::{InstrumentRecord, TradeRecord};
use super::store::EntityStore;

/// All persistent state, backed by one SQLite file.
pub struct DbStorage {
    instruments: EntityStore<InstrumentRecord>,
    trades: EntityStore<TradeRecord>,
}

impl DbStorage {
    /// Open (and create if missing) the database at `url`, e.g.
    /// `sqlite://feed.db` or `sqlite::memory:`.
    ///
    /// A single connection keeps SQLite writes serialized.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let storage = Self {
            instruments: EntityStore::new(pool.clone()).await?,
            trades: EntityStore::new(pool).await?,
        };
        info!(url, "Database ready");
        Ok(storage)
    }

    pub fn instruments(&self) -> &EntityStore<InstrumentRecord> {
        &self.instruments
    }

    pub fn trades(&self) -> &EntityStore<TradeRecord> {
        &self.trades
    }

    /// Record an instrument definition, refreshing a stale stored copy.
    /// Returns whether the definition actually changed; an identical
    /// definition leaves the row (and its timestamp) untouched.
    pub async fn record_instrument(
        &self,
        provider: &str,
        info: &InstrumentInfo,
    ) -> Result<bool, StorageError> {
        let record = InstrumentRecord::from_info(provider, info)
            .map_err(|e| StorageError::Decode {
                column: "metadata".to_string(),
                reason: e.to_string(),
            })?;

        let stored = self
            .instruments
            .query(
                &Condition::eq("provider", provider)
                    .and(Condition::eq("symbol", record.symbol.as_str())),
            )
            .await?;
        if let Some(stored) = stored.first() {
            if !stored.differs_from(&record) {
                return Ok(false);
            }
        }

        self.instruments.upsert(&record).await?;
        Ok(true)
    }

    /// All stored instrument definitions for a provider.
    pub async fn stored_instruments(
        &self,
        provider: &str,
    ) -> Result<Vec<InstrumentRecord>, StorageError> {
        self.instruments
            .query(&Condition::eq("provider", provider))
            .await
    }

    /// Persist a batch of trades. Re-delivered trades dedupe on the
    /// `(provider, symbol, trade_id)` key.
    pub async fn record_trades(
        &self,
        provider: &str,
        trades: &[PublicTrade],
    ) -> Result<u64, StorageError> {
        let mut stored = 0;
        for trade in trades {
            let record = TradeRecord::from_trade(provider, trade);
            if self.trades.upsert(&record).await? {
                stored += 1;
            }
        }
        Ok(stored)
    }

    /// Trades for a symbol at or after `since_ms`, oldest first.
    pub async fn trades_since(
        &self,
        provider: &str,
        symbol: &str,
        since_ms: i64,
    ) -> Result<Vec<TradeRecord>, StorageError> {
        let mut rows = self
            .trades
            .query(
                &Condition::eq("provider", provider)
                    .and(Condition::eq("symbol", symbol))
                    .and(Condition::ge("executed_at_ms", since_ms)),
            )
            .await?;
        rows.sort_by_key(|r| r.executed_at_ms);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use feed_common::data::TradeSide;

    fn trade(id: &str, ts: u64, price: u64) -> PublicTrade {
        PublicTrade {
            trade_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Buy,
            timestamp_ms: ts,
            price_points: price,
            volume_points: 10,
        }
    }

    #[tokio::test]
    async fn test_record_trades_dedupes() {
        let db = DbStorage::connect("sqlite::memory:").await.unwrap();

        let batch = [trade("t1", 1000, 100), trade("t2", 1001, 101)];
        assert_eq!(db.record_trades("bybit", &batch).await.unwrap(), 2);
        // Same batch again, nothing new
        assert_eq!(db.record_trades("bybit", &batch).await.unwrap(), 0);

        assert_eq!(db.trades().count(&Condition::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_trades_since_orders_by_time() {
        let db = DbStorage::connect("sqlite::memory:").await.unwrap();
        db.record_trades(
            "bybit",
            &[trade("t3", 3000, 103), trade("t1", 1000, 101), trade("t2", 2000, 102)],
        )
        .await
        .unwrap();

        let rows = db.trades_since("bybit", "BTCUSDT", 2000).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trade_id, "t2");
        assert_eq!(rows[1].trade_id, "t3");
    }

    #[tokio::test]
    async fn test_record_instrument_upserts() {
        use crate::manager::market::tests_support::btc_info;

        let db = DbStorage::connect("sqlite::memory:").await.unwrap();
        let mut info = btc_info();

        assert!(db.record_instrument("bybit", &info).await.unwrap());
        // Identical definition: stored row untouched
        assert!(!db.record_instrument("bybit", &info).await.unwrap());

        info.base_coin = "XBT".to_string();
        assert!(db.record_instrument("bybit", &info).await.unwrap());

        let rows = db.stored_instruments("bybit").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].base_coin, "XBT");
    }
}
