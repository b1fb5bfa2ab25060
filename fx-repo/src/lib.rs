//! # FX Repository
//!
//! Concrete rate store implementations (adapters) for the exchange rate
//! service. Every adapter implements the `RateStore` port; [`Repo`] picks
//! one at runtime from the database URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fx_types::{Clock, CurrencyCode, RateRecord, RateStore, RequestContext, StoreError};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
mod types;


pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Expiry hint for a record written at `now` with the given TTL.
pub(crate) fn expiry_hint(now: DateTime<Utc>, ttl: Duration) -> Option<i64> {
    if ttl.is_zero() {
        return None;
    }
    let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    Some(now.timestamp().saturating_add(secs))
}

pub(crate) fn grace_secs(grace: Duration) -> i64 {
    i64::try_from(grace.as_secs()).unwrap_or(i64::MAX)
}

/// True once `expiry + grace` is strictly before `now`.
pub(crate) fn is_evictable(expiry: Option<i64>, now: DateTime<Utc>, grace: Duration) -> bool {
    match expiry {
        Some(expiry) => expiry.saturating_add(grace_secs(grace)) < now.timestamp(),
        None => false,
    }
}

/// Unified store wrapper selected from the database URL scheme.
pub enum Repo {
    Memory(MemoryStore),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteStore),
    #[cfg(feature = "postgres")]
    Postgres(PostgresStore),
}

/// Build and initialize a store from a database URL.
///
/// Supported schemes: `memory://` always, `sqlite:` with the `sqlite`
/// feature, `postgres://` / `postgresql://` with the `postgres` feature.
/// SQL stores are migrated before they are returned.
///
/// # Examples
///
/// ```ignore
/// let repo = build_repo("memory://", Arc::new(SystemClock)).await?;
/// let repo = build_repo("sqlite://data/rates.db?mode=rwc", clock).await?;
/// ```
pub async fn build_repo(database_url: &str, clock: Arc<dyn Clock>) -> anyhow::Result<Repo> {
    Repo::new(database_url, clock).await
}

impl Repo {
    pub async fn new(database_url: &str, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        if database_url.starts_with("memory:") {
            return Ok(Self::Memory(MemoryStore::with_clock(clock)));
        }

        #[cfg(feature = "sqlite")]
        if database_url.starts_with("sqlite:") {
            return Ok(Self::Sqlite(
                SqliteStore::with_clock(database_url, clock).await?,
            ));
        }

        #[cfg(feature = "postgres")]
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            return Ok(Self::Postgres(
                PostgresStore::with_clock(database_url, clock).await?,
            ));
        }

        let scheme = database_url.split(':').next().unwrap_or_default();
        anyhow::bail!(
            "Unsupported DATABASE_URL scheme {:?} (is the matching feature enabled?)",
            scheme
        )
    }

    /// Backend name for logs and health output.
    pub fn kind(&self) -> &'static str {
        match self {
            Repo::Memory(_) => "memory",
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Repo::Postgres(_) => "postgres",
        }
    }

    /// Evicts records whose expiry hint is older than `now - grace`.
    pub async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, StoreError> {
        match self {
            Repo::Memory(store) => Ok(store.purge_expired(now, grace)),
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(store) => store.purge_expired(now, grace).await,
            #[cfg(feature = "postgres")]
            Repo::Postgres(store) => store.purge_expired(now, grace).await,
        }
    }

    fn store(&self) -> &dyn RateStore {
        match self {
            Repo::Memory(store) => store,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(store) => store,
            #[cfg(feature = "postgres")]
            Repo::Postgres(store) => store,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implement RateStore for Repo (delegation)
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl RateStore for Repo {
    async fn get(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        self.store().get(ctx, base, target).await
    }

    async fn get_stale(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        self.store().get_stale(ctx, base, target).await
    }

    async fn get_by_base(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<RateRecord>, StoreError> {
        self.store().get_by_base(ctx, base).await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        record: RateRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.store().put(ctx, record, ttl).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<(), StoreError> {
        self.store().delete(ctx, base, target).await
    }
}
