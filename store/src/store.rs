//! SQLite-backed exchange-rate persistence.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use cambio_common::{Currency, ExchangeRate};

use crate::error::{StoreError, StoreResult};

/// Schema version recorded in `PRAGMA user_version`. A bump triggers
/// one-time key-space setup on open, not migration of existing records.
const SCHEMA_VERSION: i32 = 1;

/// Durable store for exchange-rate records, one row per `(base, target)`
/// pair.
///
/// Cheap to clone; all clones share the same connection pool.
#[derive(Clone)]
pub struct RateStore {
    pool: SqlitePool,
}

impl RateStore {
    /// Open a store backed by the given file, creating it if missing.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.setup().await?;
        Ok(store)
    }

    /// Open a store backed by a private in-memory database.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection keeps every handle on the same in-memory
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.setup().await?;
        Ok(store)
    }

    /// One-time key-space setup, gated by the schema version.
    async fn setup(&self) -> StoreResult<()> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        let version: i32 = row.try_get(0)?;

        if version < SCHEMA_VERSION {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS exchange_rates (
                     base_currency   TEXT NOT NULL,
                     target_currency TEXT NOT NULL,
                     rate            TEXT NOT NULL,
                     last_updated    TEXT NOT NULL,
                     PRIMARY KEY (base_currency, target_currency)
                 )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
                .execute(&self.pool)
                .await?;

            debug!(version = SCHEMA_VERSION, "Initialized rate store schema");
        }

        Ok(())
    }

    /// Upsert a record by its `(base, target)` composite key.
    pub async fn put(&self, record: &ExchangeRate) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO exchange_rates (base_currency, target_currency, rate, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (base_currency, target_currency)
             DO UPDATE SET rate = excluded.rate, last_updated = excluded.last_updated",
        )
        .bind(record.base.code())
        .bind(record.target.code())
        .bind(record.rate.to_string())
        .bind(record.last_updated)
        .execute(&self.pool)
        .await?;

        debug!(
            base = %record.base,
            target = %record.target,
            rate = %record.rate,
            "Stored rate"
        );

        Ok(())
    }

    /// Point lookup by composite key. `Ok(None)` when no record exists.
    pub async fn get(
        &self,
        base: &Currency,
        target: &Currency,
    ) -> StoreResult<Option<ExchangeRate>> {
        let row = sqlx::query(
            "SELECT rate, last_updated FROM exchange_rates
             WHERE base_currency = ?1 AND target_currency = ?2",
        )
        .bind(base.code())
        .bind(target.code())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.try_get("rate")?;
        let rate = Decimal::from_str(&raw).map_err(|_| StoreError::Corrupt {
            base: base.code().to_string(),
            target: target.code().to_string(),
            value: raw,
        })?;
        let last_updated: DateTime<Utc> = row.try_get("last_updated")?;

        Ok(Some(ExchangeRate::new(
            base.clone(),
            target.clone(),
            rate,
            last_updated,
        )))
    }

    /// Close the underlying pool. Further operations fail with a storage
    /// error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let store = RateStore::open_in_memory().await.unwrap();
        let record = ExchangeRate::new(
            Currency::usd(),
            Currency::eur(),
            dec!(1.1),
            ts("2026-08-04T09:30:00Z"),
        );

        store.put(&record).await.unwrap();

        let loaded = store
            .get(&Currency::usd(), &Currency::eur())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.rate, record.rate);
        assert_eq!(loaded.last_updated, record.last_updated);
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = RateStore::open_in_memory().await.unwrap();

        let loaded = store.get(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_pair() {
        let store = RateStore::open_in_memory().await.unwrap();
        let first = ExchangeRate::new(
            Currency::usd(),
            Currency::eur(),
            dec!(1.1),
            ts("2026-08-04T09:30:00Z"),
        );
        let second = ExchangeRate::new(
            Currency::usd(),
            Currency::eur(),
            dec!(1.2),
            ts("2026-08-05T09:30:00Z"),
        );

        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        let loaded = store
            .get(&Currency::usd(), &Currency::eur())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.rate, dec!(1.2));
        assert_eq!(loaded.last_updated, second.last_updated);
    }

    #[tokio::test]
    async fn test_pairs_are_independent() {
        let store = RateStore::open_in_memory().await.unwrap();
        let usd = ExchangeRate::new(
            Currency::usd(),
            Currency::eur(),
            dec!(1.1),
            ts("2026-08-04T09:30:00Z"),
        );
        let gbp = ExchangeRate::new(
            Currency::gbp(),
            Currency::eur(),
            dec!(0.85),
            ts("2026-08-04T10:00:00Z"),
        );

        store.put(&usd).await.unwrap();
        store.put(&gbp).await.unwrap();

        let loaded = store
            .get(&Currency::gbp(), &Currency::eur())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.rate, dec!(0.85));
    }

    #[tokio::test]
    async fn test_unparseable_stored_rate_is_corrupt() {
        let store = RateStore::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO exchange_rates (base_currency, target_currency, rate, last_updated)
             VALUES ('USD', 'EUR', 'garbage', '2026-08-04 09:30:00+00:00')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store.get(&Currency::usd(), &Currency::eur()).await;

        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_closed_store_fails_with_storage_error() {
        let store = RateStore::open_in_memory().await.unwrap();
        store.close().await;

        let result = store.get(&Currency::usd(), &Currency::eur()).await;

        assert!(matches!(result, Err(StoreError::Storage(_))));
    }
}
