//! Rate Application Service
//!
//! Read-through cache in front of the upstream provider with stale fallback.
//! Contains NO infrastructure logic - pure orchestration over the ports.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use fx_types::{
    AppError, Clock, CurrencyCode, DomainError, FreshnessWindow, ProviderError, Rate,
    RateProvider, RateRecord, RateStore, RequestContext, StoreError, SystemClock,
};

use crate::outcome::{Outcome, OutcomeCounters};

/// Application service for rate lookups.
///
/// Generic over `S: RateStore` and `P: RateProvider`; both adapters are
/// injected at compile time. `P` is expected to be the breaker-guarded,
/// retrying provider. The service holds no per-request state.
pub struct RateService<S: RateStore, P: RateProvider> {
    store: S,
    provider: P,
    clock: Arc<dyn Clock>,
    window: FreshnessWindow,
    outcomes: OutcomeCounters,
}

impl<S: RateStore, P: RateProvider> RateService<S, P> {
    /// Creates a new rate service using wall-clock time.
    pub fn new(store: S, provider: P, window: FreshnessWindow) -> Self {
        Self::with_clock(store, provider, window, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: S,
        provider: P,
        window: FreshnessWindow,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            window,
            outcomes: OutcomeCounters::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn window(&self) -> FreshnessWindow {
        self.window
    }

    pub fn outcomes(&self) -> &OutcomeCounters {
        &self.outcomes
    }

    fn emit(&self, outcome: Outcome) {
        self.outcomes.record(outcome);
        tracing::Span::current().record("outcome", outcome.as_str());
        tracing::debug!(outcome = outcome.as_str(), "rate lookup classified");
    }

    fn parse_pair(
        &self,
        base: &str,
        target: &str,
    ) -> Result<(CurrencyCode, CurrencyCode), AppError> {
        let base = CurrencyCode::parse(base)?;
        let target = CurrencyCode::parse(target)?;
        if base == target {
            return Err(DomainError::SameCurrency(base.to_string()).into());
        }
        Ok((base, target))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Single pair
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets the rate for one pair.
    #[tracing::instrument(skip(self, ctx), fields(outcome = tracing::field::Empty))]
    pub async fn get_rate(
        &self,
        ctx: &RequestContext,
        base: &str,
        target: &str,
    ) -> Result<Rate, AppError> {
        let (base, target) = match self.parse_pair(base, target) {
            Ok(pair) => pair,
            Err(e) => {
                self.emit(Outcome::InvalidInput);
                return Err(e);
            }
        };

        let now = self.clock.now();
        let cached = match self.store.get(ctx, &base, &target).await {
            Ok(record) => match self.restore(record, now) {
                Ok(rate) => Some(rate),
                Err(e) => {
                    self.emit(Outcome::UpstreamMiss);
                    return Err(e);
                }
            },
            Err(StoreError::NotFound) => None,
            Err(e) => {
                tracing::warn!(error = %e, "store read failed, treating as cache miss");
                None
            }
        };

        if let Some(rate) = &cached {
            if rate.is_fresh(now, self.window) {
                self.emit(Outcome::FreshHit);
                return Ok(rate.clone());
            }
        }

        match self.provider.fetch_one(ctx, &base, &target).await {
            Ok(rate) => {
                self.write_through(ctx, &rate).await;
                self.emit(if cached.is_some() {
                    Outcome::StaleRefresh
                } else {
                    Outcome::UpstreamMiss
                });
                Ok(rate)
            }
            Err(err) => {
                let err = AppError::from(err);
                if !err.allows_stale_fallback() {
                    self.emit(Outcome::UpstreamMiss);
                    return Err(err);
                }

                tracing::warn!(error = %err, "upstream failed, attempting stale fallback");
                match self.stale_fallback(ctx, &base, &target, cached, now).await {
                    Some(rate) => {
                        self.emit(Outcome::StaleFallback);
                        Ok(rate)
                    }
                    None => {
                        self.emit(Outcome::UpstreamMiss);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Re-materializes cached data with `stale=true`.
    ///
    /// Without a cached record, issues one dedicated stale read.
    async fn stale_fallback(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
        cached: Option<Rate>,
        now: DateTime<Utc>,
    ) -> Option<Rate> {
        if let Some(rate) = cached {
            return Some(rate.to_stale());
        }

        match self.store.get_stale(ctx, base, target).await {
            Ok(record) => self.restore(record, now).ok().map(|rate| rate.to_stale()),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                tracing::warn!(error = %e, "stale read failed");
                None
            }
        }
    }

    /// Rebuilds a cached rate. A record failing validation is `Internal`.
    fn restore(&self, record: RateRecord, now: DateTime<Utc>) -> Result<Rate, AppError> {
        let key = record.key.clone();
        record.into_rate(now).map_err(|e| {
            tracing::error!(%key, error = %e, "corrupt record in store");
            AppError::Internal(format!("corrupt record {}", key))
        })
    }

    /// Upserts a fresh rate. Failures are logged, never surfaced.
    async fn write_through(&self, ctx: &RequestContext, rate: &Rate) {
        let record = RateRecord::from_rate(rate);
        if let Err(e) = self.store.put(ctx, record, self.window.store_ttl()).await {
            match e {
                StoreError::Context(reason) => {
                    tracing::debug!(%reason, "write-through abandoned")
                }
                other => tracing::warn!(error = %other, "write-through failed"),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // All rates for a base
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets every known rate for a base currency.
    #[tracing::instrument(skip(self, ctx), fields(outcome = tracing::field::Empty))]
    pub async fn get_all_rates(
        &self,
        ctx: &RequestContext,
        base: &str,
    ) -> Result<Vec<Rate>, AppError> {
        let base = match CurrencyCode::parse(base) {
            Ok(base) => base,
            Err(e) => {
                self.emit(Outcome::InvalidInput);
                return Err(e.into());
            }
        };

        let now = self.clock.now();
        let cached: Vec<Rate> = match self.store.get_by_base(ctx, &base).await {
            Ok(records) => records
                .into_iter()
                .filter_map(|record| self.restore(record, now).ok())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "store read failed, treating as cache miss");
                Vec::new()
            }
        };

        if !cached.is_empty() && cached.iter().all(|r| r.is_fresh(now, self.window)) {
            self.emit(Outcome::FreshHit);
            return Ok(cached);
        }

        match self.provider.fetch_all(ctx, &base).await {
            Ok(rates) => {
                for rate in &rates {
                    self.write_through(ctx, rate).await;
                }
                self.emit(if cached.is_empty() {
                    Outcome::UpstreamMiss
                } else {
                    Outcome::StaleRefresh
                });
                Ok(rates)
            }
            Err(err) => self.fallback_all(&base, cached, err),
        }
    }

    fn fallback_all(
        &self,
        base: &CurrencyCode,
        cached: Vec<Rate>,
        err: ProviderError,
    ) -> Result<Vec<Rate>, AppError> {
        let err = AppError::from(err);
        if err.allows_stale_fallback() && !cached.is_empty() {
            tracing::warn!(error = %err, "upstream failed, serving stale rates");
            self.emit(Outcome::StaleFallback);
            return Ok(cached.iter().map(Rate::to_stale).collect());
        }

        tracing::debug!(%base, error = %err, "no cached rates to fall back on");
        self.emit(Outcome::UpstreamMiss);
        Err(err)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────────

    /// Removes a cached pair. Never touches the upstream.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_rate(
        &self,
        ctx: &RequestContext,
        base: &str,
        target: &str,
    ) -> Result<(), AppError> {
        let (base, target) = self.parse_pair(base, target)?;
        self.store
            .delete(ctx, &base, &target)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::NotFound(format!("{}/{}", base, target)),
                other => other.into(),
            })?;
        tracing::info!(%base, %target, "cached rate deleted");
        Ok(())
    }
}
