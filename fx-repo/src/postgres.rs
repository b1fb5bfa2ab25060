//! PostgreSQL rate store adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use fx_types::{
    Clock, CurrencyCode, RateRecord, RateStore, RequestContext, StoreError, SystemClock,
    record_key,
};

use crate::types::{DbRate, db_err};
use crate::{expiry_hint, grace_secs};

/// PostgreSQL rate store.
pub struct PostgresStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

impl PostgresStore {
    /// Connects and runs migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_clock(database_url, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(database_url: &str, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        execute_migration(
            &pool,
            include_str!("../migrations/0001_create_rates_pg.sql"),
            "0001",
        )
        .await?;

        Ok(Self { pool, clock })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deletes rows whose expiry hint lies more than `grace` in the past.
    pub async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM rates WHERE ttl IS NOT NULL AND ttl + $1 < $2"#)
            .bind(grace_secs(grace))
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        let evicted = result.rows_affected();
        if evicted > 0 {
            tracing::debug!(evicted, "purged expired rates from postgres");
        }
        Ok(evicted)
    }
}

#[async_trait]
impl RateStore for PostgresStore {
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
                    r#"SELECT pk, base, target, rate, timestamp, stale, ttl FROM rates WHERE pk = $1"#,
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
                    r#"SELECT pk, base, target, rate, timestamp, stale, ttl FROM rates WHERE base = $1 ORDER BY target"#,
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
                   VALUES ($1, $2, $3, $4, $5, $6, $7)
                   ON CONFLICT (pk) DO UPDATE SET
                       base = EXCLUDED.base,
                       target = EXCLUDED.target,
                       rate = EXCLUDED.rate,
                       timestamp = EXCLUDED.timestamp,
                       stale = EXCLUDED.stale,
                       ttl = EXCLUDED.ttl"#,
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
                sqlx::query(r#"DELETE FROM rates WHERE pk = $1"#)
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
