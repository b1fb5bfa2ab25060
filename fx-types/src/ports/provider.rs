//! Upstream rate provider port.
//!
//! This trait defines the interface for exchange rate sources.
//! Implementations can be HTTP clients, resilience wrappers, mock providers, etc.

use std::sync::Arc;

use crate::context::{ContextError, RequestContext};
use crate::domain::{CurrencyCode, Rate};

/// Error type for upstream rate operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Upstream request failed: {message}")]
    Transport { message: String, transient: bool },

    #[error("Upstream returned HTTP {0}")]
    Status(u16),

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Upstream response has no rate for {0}")]
    MissingRate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl ProviderError {
    /// Transport-level failures worth another attempt: timeouts, I/O errors,
    /// 5xx and 429 responses.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport { transient, .. } => *transient,
            ProviderError::Status(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this error says something about upstream health.
    ///
    /// Context endings and caller-side validation failures do not.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            ProviderError::Context(_) | ProviderError::InvalidInput(_)
        )
    }
}

/// Port trait for upstream rate providers.
#[async_trait::async_trait]
pub trait RateProvider: Send + Sync + 'static {
    /// Fetches the rate for one pair.
    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Rate, ProviderError>;

    /// Fetches every rate the upstream publishes for `base`.
    async fn fetch_all(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<Rate>, ProviderError>;
}

#[async_trait::async_trait]
impl<T: RateProvider + ?Sized> RateProvider for Arc<T> {
    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Rate, ProviderError> {
        (**self).fetch_one(ctx, base, target).await
    }

    async fn fetch_all(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<Rate>, ProviderError> {
        (**self).fetch_all(ctx, base).await
    }
}
