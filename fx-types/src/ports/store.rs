//! Rate store port trait.
//!
//! Adapters (in-memory, SQLite, Postgres) implement this trait.
//! The rate service depends on it, never on a concrete store.

use std::sync::Arc;
use std::time::Duration;

use crate::context::RequestContext;
use crate::domain::{CurrencyCode, RateRecord};
use crate::error::StoreError;

/// Durable key-value storage of the latest rate per currency pair.
///
/// Records are keyed by `RATE#{BASE}#{TARGET}` with a secondary lookup on
/// the base currency.
#[async_trait::async_trait]
pub trait RateStore: Send + Sync + 'static {
    /// Gets the record for a pair, even past its advisory expiry.
    async fn get(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError>;

    /// Same lookup as [`RateStore::get`], issued when looking for fallback data.
    async fn get_stale(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        self.get(ctx, base, target).await
    }

    /// Lists every record for a base currency, ordered by target.
    async fn get_by_base(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<RateRecord>, StoreError>;

    /// Upserts a record. A non-zero `ttl` sets the expiry hint to `now + ttl`,
    /// otherwise the hint is cleared.
    async fn put(
        &self,
        ctx: &RequestContext,
        record: RateRecord,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Deletes a record, `NotFound` if absent. Administrative only.
    async fn delete(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<T: RateStore + ?Sized> RateStore for Arc<T> {
    async fn get(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        (**self).get(ctx, base, target).await
    }

    async fn get_stale(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        (**self).get_stale(ctx, base, target).await
    }

    async fn get_by_base(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<RateRecord>, StoreError> {
        (**self).get_by_base(ctx, base).await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        record: RateRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        (**self).put(ctx, record, ttl).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<(), StoreError> {
        (**self).delete(ctx, base, target).await
    }
}
