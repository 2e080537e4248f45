//! Generic entity store.
//!
//! One store per entity type; the table is created at construction so a
//! fresh database file is usable immediately.

use std::marker::PhantomData;

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::condition::Condition;
use super::entity::{Entity, StorageError};
use super::value::SqlValue;

pub struct EntityStore<E> {
    pool: SqlitePool,
    _entity: PhantomData<E>,
}

impl<E: Entity> EntityStore<E> {
    /// Bind a store to a pool, creating the table if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::query(&Self::create_table_sql()).execute(&pool).await?;
        debug!(table = E::table(), "Entity table ready");
        Ok(Self {
            pool,
            _entity: PhantomData,
        })
    }

    fn create_table_sql() -> String {
        let columns: Vec<String> = E::columns()
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{}", c.name, c.sql_type, null)
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
            E::table(),
            columns.join(", "),
            E::primary_key().join(", ")
        )
    }

    fn column_names() -> Vec<&'static str> {
        E::columns().iter().map(|c| c.name).collect()
    }

    fn non_key_columns() -> Vec<&'static str> {
        Self::column_names()
            .into_iter()
            .filter(|name| !E::primary_key().contains(name))
            .collect()
    }

    /// Insert a new row. Fails on a primary-key collision.
    pub async fn insert(&self, entity: &E) -> Result<(), StorageError> {
        let columns = Self::column_names();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::table(),
            columns.join(", "),
            placeholders
        );

        let values = entity.values();
        let mut query = sqlx::query(&sql);
        for value in &values {
            query = value.bind(query);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a batch inside one transaction.
    pub async fn insert_many(&self, entities: &[E]) -> Result<(), StorageError> {
        let columns = Self::column_names();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::table(),
            columns.join(", "),
            placeholders
        );

        let mut tx = self.pool.begin().await?;
        for entity in entities {
            let values = entity.values();
            let mut query = sqlx::query(&sql);
            for value in &values {
                query = value.bind(query);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert or update on key collision.
    ///
    /// Returns whether the database actually changed: inserting a row
    /// identical to the stored one reports `false`. The update is guarded
    /// so an unchanged row does not bump SQLite's change counter.
    pub async fn upsert(&self, entity: &E) -> Result<bool, StorageError> {
        let columns = Self::column_names();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let non_key = Self::non_key_columns();

        let conflict_action = if non_key.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let assignments: Vec<String> = non_key
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            let changed_guard: Vec<String> = non_key
                .iter()
                .map(|c| format!("{c} IS NOT excluded.{c}"))
                .collect();
            format!(
                "DO UPDATE SET {} WHERE {}",
                assignments.join(", "),
                changed_guard.join(" OR ")
            )
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            E::table(),
            columns.join(", "),
            placeholders,
            E::primary_key().join(", "),
            conflict_action
        );

        let values = entity.values();
        let mut query = sqlx::query(&sql);
        for value in &values {
            query = value.bind(query);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rows matching the condition, in unspecified order.
    pub async fn query(&self, condition: &Condition) -> Result<Vec<E>, StorageError> {
        let mut params = Vec::new();
        let sql = format!(
            "SELECT {} FROM {}{}",
            Self::column_names().join(", "),
            E::table(),
            condition.to_where_clause(&mut params)
        );

        let mut query = sqlx::query(&sql);
        for value in &params {
            query = value.bind(query);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(E::from_row).collect()
    }

    /// Every row in the table.
    pub async fn query_all(&self) -> Result<Vec<E>, StorageError> {
        self.query(&Condition::All).await
    }

    /// Number of rows matching the condition.
    pub async fn count(&self, condition: &Condition) -> Result<u64, StorageError> {
        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            E::table(),
            condition.to_where_clause(&mut params)
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in params {
            query = match value {
                SqlValue::Text(v) => query.bind(v),
                SqlValue::Integer(v) => query.bind(v),
                SqlValue::Real(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::Null => query.bind(None::<i64>),
            };
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    /// Update the non-key columns of the row with this entity's key.
    /// Returns whether a row matched.
    pub async fn update(&self, entity: &E) -> Result<bool, StorageError> {
        let non_key = Self::non_key_columns();
        if non_key.is_empty() {
            return Ok(false);
        }

        let assignments: Vec<String> = non_key.iter().map(|c| format!("{c} = ?")).collect();
        let key_guard: Vec<String> = E::primary_key()
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            E::table(),
            assignments.join(", "),
            key_guard.join(" AND ")
        );

        // Reorder entity values: non-key assignments first, then the key
        let columns = Self::column_names();
        let values = entity.values();
        let value_of = |name: &&str| {
            columns
                .iter()
                .position(|c| c == name)
                .map(|i| values[i].clone())
                .unwrap_or(SqlValue::Null)
        };

        let mut query = sqlx::query(&sql);
        let ordered: Vec<SqlValue> = non_key
            .iter()
            .map(value_of)
            .chain(E::primary_key().iter().map(value_of))
            .collect();
        for value in &ordered {
            query = value.bind(query);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete matching rows. An unconstrained condition is refused, use
    /// [`Self::clear`] to empty the table deliberately.
    pub async fn remove(&self, condition: &Condition) -> Result<u64, StorageError> {
        if condition.is_empty() {
            return Err(StorageError::EmptyCondition);
        }

        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}",
            E::table(),
            condition.to_where_clause(&mut params)
        );

        let mut query = sqlx::query(&sql);
        for value in &params {
            query = value.bind(query);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete every row.
    pub async fn clear(&self) -> Result<u64, StorageError> {
        let sql = format!("DELETE FROM {}", E::table());
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Drop the table entirely. The store is unusable afterwards.
    pub async fn drop_table(self) -> Result<(), StorageError> {
        let sql = format!("DROP TABLE IF EXISTS {}", E::table());
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity;

    entity! {
        pub struct Watchitem {
            pk = [provider, symbol];
            provider: String,
            symbol: String,
            depth: i64,
            note: Option<String>,
        }
    }

    async fn store() -> EntityStore<Watchitem> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        EntityStore::new(pool).await.unwrap()
    }

    fn item(symbol: &str, depth: i64) -> Watchitem {
        Watchitem {
            provider: "bybit".to_string(),
            symbol: symbol.to_string(),
            depth,
            note: None,
        }
    }

    #[test]
    fn test_create_table_sql() {
        let sql = EntityStore::<Watchitem>::create_table_sql();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS watchitem (provider TEXT NOT NULL, \
             symbol TEXT NOT NULL, depth INTEGER NOT NULL, note TEXT, \
             PRIMARY KEY (provider, symbol))"
        );
    }

    #[tokio::test]
    async fn test_insert_and_query_round_trip() {
        let store = store().await;
        let original = Watchitem {
            provider: "bybit".to_string(),
            symbol: "BTCUSDT".to_string(),
            depth: 50,
            note: Some("main".to_string()),
        };
        store.insert(&original).await.unwrap();

        let rows = store
            .query(&Condition::eq("symbol", "BTCUSDT"))
            .await
            .unwrap();
        assert_eq!(rows, vec![original]);
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_fails() {
        let store = store().await;
        store.insert(&item("BTCUSDT", 50)).await.unwrap();
        assert!(store.insert(&item("BTCUSDT", 200)).await.is_err());
    }

    #[tokio::test]
    async fn test_insert_many_is_atomic() {
        let store = store().await;
        store.insert(&item("ETHUSDT", 50)).await.unwrap();

        // A duplicate key anywhere in the batch rolls the whole batch back
        let batch = [item("BTCUSDT", 50), item("ETHUSDT", 50)];
        assert!(store.insert_many(&batch).await.is_err());
        assert_eq!(store.count(&Condition::All).await.unwrap(), 1);

        store
            .insert_many(&[item("BTCUSDT", 50), item("SOLUSDT", 200)])
            .await
            .unwrap();
        assert_eq!(store.query_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_reports_change_precisely() {
        let store = store().await;

        // Fresh row: changed
        assert!(store.upsert(&item("BTCUSDT", 50)).await.unwrap());
        // Identical row: no change
        assert!(!store.upsert(&item("BTCUSDT", 50)).await.unwrap());
        // One field differs: changed
        assert!(store.upsert(&item("BTCUSDT", 200)).await.unwrap());

        let rows = store.query(&Condition::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].depth, 200);
    }

    #[tokio::test]
    async fn test_count_and_conditions() {
        let store = store().await;
        store.insert(&item("BTCUSDT", 50)).await.unwrap();
        store.insert(&item("ETHUSDT", 50)).await.unwrap();
        store.insert(&item("SOLUSDT", 200)).await.unwrap();

        assert_eq!(store.count(&Condition::All).await.unwrap(), 3);
        assert_eq!(
            store.count(&Condition::eq("depth", 50i64)).await.unwrap(),
            2
        );
        assert_eq!(
            store
                .count(
                    &Condition::eq("depth", 50i64)
                        .and(Condition::like("symbol", "BTC%"))
                )
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_by_key() {
        let store = store().await;
        store.insert(&item("BTCUSDT", 50)).await.unwrap();

        let mut changed = item("BTCUSDT", 500);
        changed.note = Some("deep".to_string());
        assert!(store.update(&changed).await.unwrap());

        let rows = store.query(&Condition::All).await.unwrap();
        assert_eq!(rows[0].depth, 500);
        assert_eq!(rows[0].note.as_deref(), Some("deep"));

        // Missing key matches nothing
        assert!(!store.update(&item("XRPUSDT", 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_refuses_empty_condition() {
        let store = store().await;
        store.insert(&item("BTCUSDT", 50)).await.unwrap();

        let err = store.remove(&Condition::All).await.unwrap_err();
        assert!(matches!(err, StorageError::EmptyCondition));
        assert_eq!(store.count(&Condition::All).await.unwrap(), 1);

        let removed = store
            .remove(&Condition::eq("symbol", "BTCUSDT"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_clear_empties_table() {
        let store = store().await;
        store.insert(&item("BTCUSDT", 50)).await.unwrap();
        store.insert(&item("ETHUSDT", 50)).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count(&Condition::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_null_round_trip() {
        let store = store().await;
        store.insert(&item("BTCUSDT", 50)).await.unwrap();

        let rows = store.query(&Condition::is_null("note")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].note, None);
        assert!(store
            .query(&Condition::is_not_null("note"))
            .await
            .unwrap()
            .is_empty());
    }
}
