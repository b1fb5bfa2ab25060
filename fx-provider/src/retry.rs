//! Retry wrapper with exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use fx_types::{CurrencyCode, ProviderError, Rate, RateProvider, RequestContext};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first attempt)
    max_attempts: u32,
    /// Delay before the first retry
    initial_delay: Duration,
    /// Maximum delay between retries
    max_delay: Duration,
    /// Backoff multiplier
    multiplier: f64,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff curve (100 ms, x2, capped at 5 s).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Sets the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Retries transient upstream failures.
///
/// Only [`ProviderError::is_transient`] errors are retried: malformed
/// 200 responses, 4xx statuses, validation and context errors return at once.
/// Backoff sleeps honour the request context.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: RateProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, ctx: &RequestContext, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying upstream call"
                    );
                    ctx.run(tokio::time::sleep(delay)).await?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<P: RateProvider> RateProvider for RetryingProvider<P> {
    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Rate, ProviderError> {
        self.with_retry(ctx, || self.inner.fetch_one(ctx, base, target))
            .await
    }

    async fn fetch_all(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<Rate>, ProviderError> {
        self.with_retry(ctx, || self.inner.fetch_all(ctx, base)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, usd_eur};
    use fx_types::ContextError;

    #[test]
    fn test_backoff_curve() {
        let policy = RetryPolicy::new(10);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(7), Duration::from_secs(5));
        assert_eq!(policy.delay_after(40), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let (base, target) = usd_eur();
        let inner = ScriptedProvider::new(vec![
            Err(ProviderError::Status(503)),
            Err(ProviderError::Transport {
                message: "timed out".into(),
                transient: true,
            }),
            Ok(0.9),
        ]);
        let provider = RetryingProvider::new(inner, RetryPolicy::default());

        let rate = provider
            .fetch_one(&RequestContext::background(), &base, &target)
            .await
            .unwrap();

        assert_eq!(rate.value(), 0.9);
        assert_eq!(provider.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (base, target) = usd_eur();
        let inner = ScriptedProvider::failing(ProviderError::Status(500));
        let provider = RetryingProvider::new(inner, RetryPolicy::new(3));

        let result = provider
            .fetch_one(&RequestContext::background(), &base, &target)
            .await;

        assert!(matches!(result, Err(ProviderError::Status(500))));
        assert_eq!(provider.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_errors_are_not_retried() {
        let (base, target) = usd_eur();
        for err in [
            ProviderError::Status(404),
            ProviderError::Malformed("not json".into()),
            ProviderError::MissingRate("usd".into()),
            ProviderError::InvalidInput("USD/USD".into()),
        ] {
            let provider =
                RetryingProvider::new(ScriptedProvider::failing(err), RetryPolicy::default());
            let _ = provider
                .fetch_one(&RequestContext::background(), &base, &target)
                .await;
            assert_eq!(provider.inner().calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_honours_deadline() {
        let (base, target) = usd_eur();
        let inner = ScriptedProvider::failing(ProviderError::Status(503));
        let provider = RetryingProvider::new(
            inner,
            RetryPolicy::new(5).with_initial_delay(Duration::from_secs(1)),
        );
        let ctx = RequestContext::with_timeout(Duration::from_millis(500));

        let result = provider.fetch_one(&ctx, &base, &target).await;

        assert!(matches!(
            result,
            Err(ProviderError::Context(ContextError::DeadlineExceeded))
        ));
        assert_eq!(provider.inner().calls(), 1);
    }
}
