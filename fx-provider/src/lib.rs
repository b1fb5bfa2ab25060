//! Upstream exchange rate provider.
//!
//! Layers, innermost first:
//! - [`HttpRateClient`] talks to the public currency feed, walking its
//!   mirror list on failure
//! - [`RetryingProvider`] retries transient failures with backoff
//! - [`GuardedProvider`] consults a shared [`Breaker`] before each call and
//!   reports the outcome afterwards
//!
//! ```ignore
//! let breaker = Arc::new(Breaker::new(BreakerConfig::default()));
//! let provider = GuardedProvider::new(
//!     RetryingProvider::new(HttpRateClient::new(HttpClientConfig::default())?, RetryPolicy::default()),
//!     breaker.clone(),
//! );
//! ```

mod breaker;
mod client;
mod guarded;
mod retry;

#[cfg(test)]
mod testing;

pub use breaker::{Breaker, BreakerConfig, BreakerConfigError, BreakerState};
pub use client::{
    DEFAULT_FALLBACK_URL, DEFAULT_PRIMARY_URL, HttpClientConfig, HttpRateClient, parse_document,
};
pub use guarded::GuardedProvider;
pub use retry::{RetryPolicy, RetryingProvider};
