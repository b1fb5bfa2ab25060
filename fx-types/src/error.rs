//! Error types for the exchange rate service.

use crate::context::ContextError;

/// Domain-level errors (construction invariants).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),

    #[error("Base and target currency must differ: {0}")]
    SameCurrency(String),

    #[error("Rate must be positive and finite, got {0}")]
    InvalidRateValue(f64),

    #[error("Observation time is missing")]
    MissingObservedAt,

    #[error("Observation time {0} is in the future")]
    ObservedInFuture(i64),
}

/// Store-level errors (persistence failures).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes. The payloads are diagnostics only and
/// never cross the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for the failures the rate service answers with stale data when it can.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable(_)
                | AppError::CircuitOpen
                | AppError::Cancelled
                | AppError::DeadlineExceeded
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<ContextError> for AppError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => AppError::Cancelled,
            ContextError::DeadlineExceeded => AppError::DeadlineExceeded,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Rate not found".into()),
            StoreError::Database(e) => AppError::Internal(e),
            StoreError::Context(e) => e.into(),
        }
    }
}

impl From<crate::ports::ProviderError> for AppError {
    fn from(err: crate::ports::ProviderError) -> Self {
        use crate::ports::ProviderError;

        match err {
            ProviderError::CircuitOpen => AppError::CircuitOpen,
            ProviderError::Context(e) => e.into(),
            ProviderError::InvalidInput(msg) => AppError::InvalidInput(msg),
            other => AppError::ProviderUnavailable(other.to_string()),
        }
    }
}
