//! Breaker-guarded provider.

use std::sync::Arc;

use async_trait::async_trait;

use fx_types::{CurrencyCode, ProviderError, Rate, RateProvider, RequestContext};

use crate::breaker::Breaker;

/// Wraps a provider with a shared [`Breaker`].
///
/// One guarded call is one breaker observation, however many retries the
/// inner provider makes. Cancellation and caller-input errors say nothing
/// about upstream health and are not reported.
pub struct GuardedProvider<P> {
    inner: P,
    breaker: Arc<Breaker>,
}

impl<P: RateProvider> GuardedProvider<P> {
    pub fn new(inner: P, breaker: Arc<Breaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<Breaker> {
        &self.breaker
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn record<T>(&self, result: &Result<T, ProviderError>) {
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.counts_as_failure() => self.breaker.record_failure(),
            Err(e) => tracing::debug!(error = %e, "outcome not reported to breaker"),
        }
    }
}

#[async_trait]
impl<P: RateProvider> RateProvider for GuardedProvider<P> {
    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Rate, ProviderError> {
        ctx.check()?;
        if !self.breaker.admit() {
            return Err(ProviderError::CircuitOpen);
        }
        let result = self.inner.fetch_one(ctx, base, target).await;
        self.record(&result);
        result
    }

    async fn fetch_all(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<Rate>, ProviderError> {
        ctx.check()?;
        if !self.breaker.admit() {
            return Err(ProviderError::CircuitOpen);
        }
        let result = self.inner.fetch_all(ctx, base).await;
        self.record(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerState};
    use crate::testing::{ScriptedProvider, usd_eur};
    use chrono::DateTime;
    use fx_types::{ContextError, ManualClock};
    use std::time::Duration;

    fn breaker(f: u32) -> (Arc<Breaker>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let config = BreakerConfig::new(f, Duration::from_millis(50), 1).unwrap();
        (Arc::new(Breaker::with_clock(config, clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let (base, target) = usd_eur();
        let (breaker, _) = breaker(2);
        let provider = GuardedProvider::new(
            ScriptedProvider::failing(ProviderError::Status(500)),
            breaker.clone(),
        );
        let ctx = RequestContext::background();

        for _ in 0..2 {
            let result = provider.fetch_one(&ctx, &base, &target).await;
            assert!(matches!(result, Err(ProviderError::Status(500))));
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let result = provider.fetch_one(&ctx, &base, &target).await;
        assert!(matches!(result, Err(ProviderError::CircuitOpen)));
        assert_eq!(provider.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let (base, target) = usd_eur();
        let (breaker, clock) = breaker(1);
        let provider = GuardedProvider::new(
            ScriptedProvider::new(vec![Err(ProviderError::Status(502)), Ok(0.87)]),
            breaker.clone(),
        );
        let ctx = RequestContext::background();

        assert!(provider.fetch_one(&ctx, &base, &target).await.is_err());
        assert_eq!(breaker.state(), BreakerState::Open);

        clock.advance(Duration::from_millis(60));
        let rate = provider.fetch_one(&ctx, &base, &target).await.unwrap();
        assert_eq!(rate.value(), 0.87);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_context_and_input_errors_not_counted() {
        let (base, target) = usd_eur();
        let (breaker, _) = breaker(1);
        for err in [
            ProviderError::Context(ContextError::Cancelled),
            ProviderError::Context(ContextError::DeadlineExceeded),
            ProviderError::InvalidInput("USD/USD".into()),
        ] {
            let provider = GuardedProvider::new(ScriptedProvider::failing(err), breaker.clone());
            let _ = provider
                .fetch_one(&RequestContext::background(), &base, &target)
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_ended_context_leaves_open_breaker_untouched() {
        let (base, target) = usd_eur();
        let (breaker, clock) = breaker(1);
        let provider =
            GuardedProvider::new(ScriptedProvider::new(vec![Ok(0.85)]), breaker.clone());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        clock.advance(Duration::from_millis(60));
        let (ctx, handle) = RequestContext::with_cancel();
        handle.cancel();

        let result = provider.fetch_one(&ctx, &base, &target).await;
        assert!(matches!(
            result,
            Err(ProviderError::Context(ContextError::Cancelled))
        ));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(provider.inner().calls(), 0);
    }

    #[tokio::test]
    async fn test_non_transient_errors_still_count() {
        let (base, _) = usd_eur();
        let (breaker, _) = breaker(1);
        let provider = GuardedProvider::new(
            ScriptedProvider::failing(ProviderError::Malformed("bad".into())),
            breaker.clone(),
        );
        let _ = provider
            .fetch_all(&RequestContext::background(), &base)
            .await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
