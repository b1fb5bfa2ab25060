//! Persisted image of a [`Rate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::currency::CurrencyCode;
use super::rate::Rate;
use crate::error::DomainError;

/// Prefix of every composite store key.
pub const KEY_PREFIX: &str = "RATE#";

/// Builds the composite key `RATE#{BASE}#{TARGET}`.
pub fn record_key(base: &CurrencyCode, target: &CurrencyCode) -> String {
    format!("{}{}#{}", KEY_PREFIX, base, target)
}

/// A rate as the store holds it.
///
/// `base` and `target` stay raw strings: a record is only trusted once
/// [`RateRecord::into_rate`] has re-validated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    #[serde(rename = "PK")]
    pub key: String,
    #[serde(rename = "Base")]
    pub base: String,
    #[serde(rename = "Target")]
    pub target: String,
    #[serde(rename = "Rate")]
    pub value: f64,
    /// Unix seconds.
    #[serde(rename = "Timestamp")]
    pub observed_at_epoch_seconds: i64,
    #[serde(rename = "Stale")]
    pub stale: bool,
    /// Advisory eviction hint in Unix seconds; the store may keep the record longer.
    #[serde(rename = "ttl", default, skip_serializing_if = "Option::is_none")]
    pub store_expiry_epoch_seconds: Option<i64>,
}

impl RateRecord {
    /// Builds the store image of `rate` without an expiry hint.
    pub fn from_rate(rate: &Rate) -> Self {
        Self {
            key: record_key(&rate.base(), &rate.target()),
            base: rate.base().to_string(),
            target: rate.target().to_string(),
            value: rate.value(),
            observed_at_epoch_seconds: rate.observed_at().timestamp(),
            stale: rate.is_stale(),
            store_expiry_epoch_seconds: None,
        }
    }

    /// Reconstructs and re-validates the domain rate.
    pub fn into_rate(self, now: DateTime<Utc>) -> Result<Rate, DomainError> {
        let base = CurrencyCode::parse(&self.base)?;
        let target = CurrencyCode::parse(&self.target)?;
        let observed_at = DateTime::from_timestamp(self.observed_at_epoch_seconds, 0)
            .ok_or(DomainError::MissingObservedAt)?;
        Rate::from_parts(base, target, self.value, observed_at, self.stale, now)
    }
}
