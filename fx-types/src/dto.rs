//! Data Transfer Objects (DTOs) for responses.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Rate;

// ─────────────────────────────────────────────────────────────────────────────
// Rate DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// A single currency pair quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RateResponse {
    #[schema(example = "USD")]
    pub base: String,
    #[schema(example = "EUR")]
    pub target: String,
    /// Units of `target` per one unit of `base`
    #[schema(example = 0.85)]
    pub rate: f64,
    /// When the rate was observed upstream
    pub observed_at: DateTime<Utc>,
    /// True when served from cache because the upstream could not be consulted
    pub stale: bool,
}

impl From<&Rate> for RateResponse {
    fn from(rate: &Rate) -> Self {
        Self {
            base: rate.base().to_string(),
            target: rate.target().to_string(),
            rate: rate.value(),
            observed_at: rate.observed_at(),
            stale: rate.is_stale(),
        }
    }
}

/// Every known quote for one base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RatesResponse {
    #[schema(example = "USD")]
    pub base: String,
    /// Target code to rate
    #[schema(example = json!({"EUR": 0.85, "GBP": 0.79}))]
    pub rates: BTreeMap<String, f64>,
    /// Oldest observation among the returned rates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
    /// True when any returned rate is a stale fallback
    pub stale: bool,
}

impl RatesResponse {
    pub fn from_rates(base: impl Into<String>, rates: &[Rate]) -> Self {
        Self {
            base: base.into(),
            rates: rates
                .iter()
                .map(|r| (r.target().to_string(), r.value()))
                .collect(),
            observed_at: rates.iter().map(Rate::observed_at).min(),
            stale: rates.iter().any(Rate::is_stale),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Health DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Per-outcome call counts since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutcomeCounts {
    pub fresh_hit: u64,
    pub stale_refresh: u64,
    pub stale_fallback: u64,
    pub upstream_miss: u64,
    pub invalid_input: u64,
}

/// Health check payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    /// Upstream circuit breaker state
    #[schema(example = "closed")]
    pub breaker: String,
    pub outcomes: OutcomeCounts,
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Invalid currency code")]
    pub error: String,
    #[schema(example = 400)]
    pub code: u16,
}
