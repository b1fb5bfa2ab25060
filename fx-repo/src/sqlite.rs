//! SQLite rate store adapter.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use fx_types::{
    Clock, CurrencyCode, RateRecord, RateStore, RequestContext, StoreError, SystemClock,
    record_key,
};

use crate::types::{DbRate, db_err};
use crate::{expiry_hint, grace_secs};

const MIGRATION: &str = include_str!("../migrations/0001_create_rates.sql");

/// SQLite rate store.
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Connects and runs migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_clock(database_url, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(database_url: &str, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `:memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool, clock };
        store.create_schema().await?;
        Ok(store)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the `rates` table and its indexes if missing.
    pub async fn create_schema(&self) -> anyhow::Result<()> {
        for statement in MIGRATION.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Migration 0001 failed: {}", e))?;
            }
        }
        Ok(())
    }

    /// Deletes rows whose expiry hint lies more than `grace` in the past.
    pub async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM rates WHERE ttl IS NOT NULL AND ttl + ? < ?"#)
            .bind(grace_secs(grace))
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        let evicted = result.rows_affected();
        if evicted > 0 {
            tracing::debug!(evicted, "purged expired rates from sqlite");
        }
        Ok(evicted)
    }
}

#[async_trait]
impl RateStore for SqliteStore {
    async fn get(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        let key = record_key(base, target);
        let row: Option<DbRate> = ctx
            .run(
                sqlx::query_as(
                    r#"SELECT pk, base, target, rate, timestamp, stale, ttl FROM rates WHERE pk = ?"#,
                )
                .bind(&key)
                .fetch_optional(&self.pool),
            )
            .await?
            .map_err(db_err)?;

        row.map(DbRate::into_record).ok_or(StoreError::NotFound)
    }

    async fn get_by_base(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<RateRecord>, StoreError> {
        let rows: Vec<DbRate> = ctx
            .run(
                sqlx::query_as(
                    r#"SELECT pk, base, target, rate, timestamp, stale, ttl FROM rates WHERE base = ? ORDER BY target"#,
                )
                .bind(base.as_str())
                .fetch_all(&self.pool),
            )
            .await?
            .map_err(db_err)?;

        Ok(rows.into_iter().map(DbRate::into_record).collect())
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        record: RateRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expiry = expiry_hint(self.clock.now(), ttl);
        ctx.run(
            sqlx::query(
                r#"INSERT INTO rates (pk, base, target, rate, timestamp, stale, ttl)
                   VALUES (?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(pk) DO UPDATE SET
                       base = excluded.base,
                       target = excluded.target,
                       rate = excluded.rate,
                       timestamp = excluded.timestamp,
                       stale = excluded.stale,
                       ttl = excluded.ttl"#,
            )
            .bind(&record.key)
            .bind(&record.base)
            .bind(&record.target)
            .bind(record.value)
            .bind(record.observed_at_epoch_seconds)
            .bind(record.stale)
            .bind(expiry)
            .execute(&self.pool),
        )
        .await?
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<(), StoreError> {
        let key = record_key(base, target);
        let result = ctx
            .run(
                sqlx::query(r#"DELETE FROM rates WHERE pk = ?"#)
                    .bind(&key)
                    .execute(&self.pool),
            )
            .await?
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
