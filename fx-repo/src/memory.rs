//! In-memory rate store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use fx_types::{
    Clock, CurrencyCode, RateRecord, RateStore, RequestContext, StoreError, SystemClock,
    record_key,
};

use crate::{expiry_hint, is_evictable};

/// Process-local store backed by [`DashMap`].
///
/// Keeps a secondary index (base -> target -> key) so `get_by_base` never
/// scans the whole map.
pub struct MemoryStore {
    records: DashMap<String, RateRecord>,
    by_base: DashMap<String, BTreeMap<String, String>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            by_base: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops the index entry unless a concurrent `put` has re-inserted the
    /// record. `put` writes the record before the index, so checking under the
    /// index shard lock cannot drop a live entry.
    fn unindex(&self, key: &str, base: &str, target: &str) {
        if let Some(mut targets) = self.by_base.get_mut(base) {
            if !self.records.contains_key(key) {
                targets.remove(target);
            }
        }
        self.by_base.remove_if(base, |_, targets| targets.is_empty());
    }

    /// Removes records whose expiry hint lies more than `grace` in the past.
    pub fn purge_expired(&self, now: DateTime<Utc>, grace: Duration) -> u64 {
        let mut evicted = Vec::new();
        self.records.retain(|_, record| {
            if is_evictable(record.store_expiry_epoch_seconds, now, grace) {
                evicted.push((record.key.clone(), record.base.clone(), record.target.clone()));
                false
            } else {
                true
            }
        });
        for (key, base, target) in &evicted {
            self.unindex(key, base, target);
        }
        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), "purged expired rates from memory");
        }
        evicted.len() as u64
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn get(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateRecord, StoreError> {
        ctx.check()?;
        self.records
            .get(&record_key(base, target))
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_base(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<RateRecord>, StoreError> {
        ctx.check()?;
        let keys: Vec<String> = match self.by_base.get(base.as_str()) {
            Some(targets) => targets.values().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        Ok(keys
            .iter()
            .filter_map(|key| self.records.get(key).map(|r| r.value().clone()))
            .collect())
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        mut record: RateRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        ctx.check()?;
        record.store_expiry_epoch_seconds = expiry_hint(self.clock.now(), ttl);

        let (key, base, target) = (record.key.clone(), record.base.clone(), record.target.clone());
        self.records.insert(key.clone(), record);
        self.by_base.entry(base).or_default().insert(target, key);
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<(), StoreError> {
        ctx.check()?;
        match self.records.remove(&record_key(base, target)) {
            Some((_, record)) => {
                self.unindex(&record.key, &record.base, &record.target);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_types::{ContextError, ManualClock, Rate};

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn record(base: &str, target: &str, value: f64) -> RateRecord {
        let rate = Rate::new(code(base), code(target), value, start(), start()).unwrap();
        RateRecord::from_rate(&rate)
    }

    fn store() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (store, _) = store();
        let ctx = RequestContext::background();

        store
            .put(&ctx, record("USD", "EUR", 0.85), Duration::from_secs(3600))
            .await
            .unwrap();

        let got = store.get(&ctx, &code("USD"), &code("EUR")).await.unwrap();
        assert_eq!(got.value, 0.85);
        assert_eq!(got.store_expiry_epoch_seconds, Some(1_700_003_600));
    }

    #[tokio::test]
    async fn test_zero_ttl_clears_expiry() {
        let (store, _) = store();
        let ctx = RequestContext::background();
        let mut rec = record("USD", "EUR", 0.85);
        rec.store_expiry_epoch_seconds = Some(1);

        store.put(&ctx, rec, Duration::ZERO).await.unwrap();

        let got = store.get(&ctx, &code("USD"), &code("EUR")).await.unwrap();
        assert_eq!(got.store_expiry_epoch_seconds, None);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (store, _) = store();
        let result = store
            .get(&RequestContext::background(), &code("USD"), &code("EUR"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (store, _) = store();
        let ctx = RequestContext::background();
        store
            .put(&ctx, record("USD", "EUR", 0.85), Duration::ZERO)
            .await
            .unwrap();
        store
            .put(&ctx, record("USD", "EUR", 0.86), Duration::ZERO)
            .await
            .unwrap();

        let got = store.get(&ctx, &code("USD"), &code("EUR")).await.unwrap();
        assert_eq!(got.value, 0.86);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_base_ordered_and_isolated() {
        let (store, _) = store();
        let ctx = RequestContext::background();
        for (base, target, value) in [
            ("USD", "JPY", 150.0),
            ("USD", "EUR", 0.85),
            ("EUR", "USD", 1.17),
            ("USD", "GBP", 0.79),
        ] {
            store
                .put(&ctx, record(base, target, value), Duration::ZERO)
                .await
                .unwrap();
        }

        let records = store.get_by_base(&ctx, &code("USD")).await.unwrap();
        let targets: Vec<_> = records.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["EUR", "GBP", "JPY"]);

        assert!(store.get_by_base(&ctx, &code("CHF")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _) = store();
        let ctx = RequestContext::background();
        store
            .put(&ctx, record("USD", "EUR", 0.85), Duration::ZERO)
            .await
            .unwrap();

        store.delete(&ctx, &code("USD"), &code("EUR")).await.unwrap();

        assert!(store.is_empty());
        assert!(store.get_by_base(&ctx, &code("USD")).await.unwrap().is_empty());
        assert!(matches!(
            store.delete(&ctx, &code("USD"), &code("EUR")).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_purge_respects_grace() {
        let (store, clock) = store();
        let ctx = RequestContext::background();
        store
            .put(&ctx, record("USD", "EUR", 0.85), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put(&ctx, record("USD", "GBP", 0.79), Duration::ZERO)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(120));
        assert_eq!(store.purge_expired(clock.now(), Duration::from_secs(3600)), 0);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(store.purge_expired(clock.now(), Duration::from_secs(3600)), 1);

        let left = store.get_by_base(&ctx, &code("USD")).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].target, "GBP");
    }

    #[tokio::test]
    async fn test_unindex_keeps_entry_rewritten_after_eviction() {
        let (store, _) = store();
        let ctx = RequestContext::background();
        let rec = record("USD", "EUR", 0.85);
        let key = rec.key.clone();

        // A put landing between the purge's retain and its unindex.
        store.put(&ctx, rec, Duration::from_secs(3600)).await.unwrap();
        store.unindex(&key, "USD", "EUR");

        let all = store.get_by_base(&ctx, &code("USD")).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target, "EUR");
    }

    #[tokio::test]
    async fn test_purge_then_rewrite_is_listed() {
        let (store, clock) = store();
        let ctx = RequestContext::background();
        store
            .put(&ctx, record("USD", "EUR", 0.85), Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(120));
        assert_eq!(store.purge_expired(clock.now(), Duration::from_secs(30)), 1);
        assert!(store.get_by_base(&ctx, &code("USD")).await.unwrap().is_empty());

        store
            .put(&ctx, record("USD", "EUR", 0.86), Duration::from_secs(60))
            .await
            .unwrap();
        let all = store.get_by_base(&ctx, &code("USD")).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, 0.86);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let (store, _) = store();
        let (ctx, handle) = RequestContext::with_cancel();
        handle.cancel();

        let result = store.get(&ctx, &code("USD"), &code("EUR")).await;
        assert!(matches!(
            result,
            Err(StoreError::Context(ContextError::Cancelled))
        ));
    }
}
