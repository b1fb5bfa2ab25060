//! Rate limiting middleware using Governor.
//!
//! Implements per-client rate limiting with a token bucket algorithm. Clients
//! are keyed by API key when authentication is enabled, else by peer address.

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock as _, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use fx_types::ErrorResponse;

use super::auth::{extract_api_key, hash_api_key, is_public};

/// Rate limiter state shared across requests.
pub struct RateLimiterState {
    /// Per-client rate limiters
    limiters: DashMap<String, Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    /// Quota for new clients
    quota: Quota,
    clock: DefaultClock,
    /// Only set when the auth layer has already verified the presented key
    key_by_api_key: bool,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RateLimiterState {
    /// Creates a new rate limiter state.
    ///
    /// # Arguments
    /// * `requests` - Number of requests allowed per period (also the burst size)
    /// * `period` - Time period for the quota
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let replenish = period.checked_div(burst.get()).unwrap_or(period);
        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiters: DashMap::new(),
            quota,
            clock: DefaultClock::default(),
            key_by_api_key: false,
        }
    }

    /// Keys clients by their API key instead of their address.
    pub fn keyed_by_api_key(mut self, enabled: bool) -> Self {
        self.key_by_api_key = enabled;
        self
    }

    /// Checks if a request should be rate limited.
    /// Returns `Err(wait)` with the time until the next permitted request.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();

        limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

fn client_key(request: &Request<Body>, key_by_api_key: bool) -> String {
    if key_by_api_key {
        let auth_header = request
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok());
        if let Some(key) = extract_api_key(auth_header).filter(|k| !k.is_empty()) {
            return format!("key:{}", hash_api_key(key));
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let key = client_key(&request, limiter.key_by_api_key);
    if let Err(wait) = limiter.check(&key) {
        let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        let retry_after = retry_after.max(1);
        tracing::debug!(retry_after, "rate limit exceeded");

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "Rate limit exceeded. Please try again later.".to_string(),
                code: 429,
            }),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_limited() {
        let state = RateLimiterState::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(state.check("a").is_ok());
        }
        let wait = state.check("a").unwrap_err();
        assert!(wait <= Duration::from_secs(20));
    }

    #[test]
    fn test_clients_are_independent() {
        let state = RateLimiterState::new(1, Duration::from_secs(60));
        assert!(state.check("a").is_ok());
        assert!(state.check("a").is_err());
        assert!(state.check("b").is_ok());
    }

    fn bearer(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/rates/USD")
            .header("Authorization", format!("Bearer {}", token))
            .extension(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4000))))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_unverified_tokens_key_by_address() {
        assert_eq!(client_key(&bearer("junk1"), false), "ip:10.0.0.7");
        assert_eq!(client_key(&bearer("junk2"), false), "ip:10.0.0.7");
    }

    #[test]
    fn test_verified_tokens_key_by_hash() {
        assert_eq!(
            client_key(&bearer("sk_live"), true),
            format!("key:{}", hash_api_key("sk_live"))
        );
    }

    #[test]
    fn test_zero_requests_still_allows_one() {
        let state = RateLimiterState::new(0, Duration::from_secs(60));
        assert!(state.check("a").is_ok());
    }
}
