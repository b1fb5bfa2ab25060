//! Exchange rate domain model.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;

use super::currency::CurrencyCode;
use crate::error::DomainError;

/// How far into the future an observation may lie before it is rejected.
pub const MAX_CLOCK_SKEW: TimeDelta = TimeDelta::minutes(5);

/// An observed exchange rate: one unit of `base` buys `value` units of `target`.
///
/// Immutable once built. Observation times are kept at whole-second
/// precision, which is what the store persists, so a stored rate reads
/// back equal to the one written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rate {
    base: CurrencyCode,
    target: CurrencyCode,
    value: f64,
    observed_at: DateTime<Utc>,
    stale: bool,
}

impl Rate {
    /// Creates a fresh (non-stale) rate.
    ///
    /// # Validation
    /// - `base` and `target` must differ
    /// - `value` must be finite and strictly positive
    /// - `observed_at` must not be the Unix epoch nor lie more than
    ///   [`MAX_CLOCK_SKEW`] past `now`
    pub fn new(
        base: CurrencyCode,
        target: CurrencyCode,
        value: f64,
        observed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Self::from_parts(base, target, value, observed_at, false, now)
    }

    /// Creates a rate with every field specified (for store reconstruction).
    pub fn from_parts(
        base: CurrencyCode,
        target: CurrencyCode,
        value: f64,
        observed_at: DateTime<Utc>,
        stale: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if base == target {
            return Err(DomainError::SameCurrency(base.to_string()));
        }
        if !value.is_finite() || value <= 0.0 {
            return Err(DomainError::InvalidRateValue(value));
        }
        let observed_secs = observed_at.timestamp();
        if observed_secs == 0 {
            return Err(DomainError::MissingObservedAt);
        }
        if observed_at > now + MAX_CLOCK_SKEW {
            return Err(DomainError::ObservedInFuture(observed_secs));
        }
        let observed_at =
            DateTime::from_timestamp(observed_secs, 0).ok_or(DomainError::MissingObservedAt)?;

        Ok(Self {
            base,
            target,
            value,
            observed_at,
            stale,
        })
    }

    pub fn base(&self) -> CurrencyCode {
        self.base
    }

    pub fn target(&self) -> CurrencyCode {
        self.target
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// True when this rate was served as a fallback.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// A copy of this rate tagged as a stale fallback.
    pub fn to_stale(&self) -> Rate {
        Rate {
            stale: true,
            ..self.clone()
        }
    }

    /// Fresh iff `now - observed_at < window`; an unbounded window never goes stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: FreshnessWindow) -> bool {
        window.is_fresh(self.observed_at, now)
    }
}

/// The service-wide freshness window `W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow(Option<TimeDelta>);

impl FreshnessWindow {
    /// One hour, the default window.
    pub const DEFAULT: FreshnessWindow = FreshnessWindow(Some(TimeDelta::hours(1)));

    /// Builds a window from signed seconds. Zero or negative means "never stale".
    pub fn from_secs(secs: i64) -> Self {
        if secs <= 0 {
            return Self(None);
        }
        Self(Some(TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)))
    }

    pub fn from_duration(window: Duration) -> Self {
        match TimeDelta::from_std(window) {
            Ok(delta) if delta > TimeDelta::zero() => Self(Some(delta)),
            Ok(_) => Self(None),
            Err(_) => Self(Some(TimeDelta::MAX)),
        }
    }

    /// A window under which nothing ever goes stale.
    pub fn unbounded() -> Self {
        Self(None)
    }

    pub fn is_fresh(&self, observed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.0 {
            None => true,
            Some(window) => now.signed_duration_since(observed_at) < window,
        }
    }

    /// Store-expiry hint for records written under this window.
    pub fn store_ttl(&self) -> Duration {
        self.0
            .and_then(|w| w.to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_rate_creation() {
        let rate = Rate::new(code("USD"), code("EUR"), 0.85, now(), now()).unwrap();
        assert_eq!(rate.base(), code("USD"));
        assert_eq!(rate.value(), 0.85);
        assert!(!rate.is_stale());
    }

    #[test]
    fn test_same_currency_fails() {
        let result = Rate::new(code("USD"), code("usd"), 1.0, now(), now());
        assert!(matches!(result, Err(DomainError::SameCurrency(_))));
    }

    #[test]
    fn test_invalid_values_fail() {
        for value in [0.0, -1.5, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let result = Rate::new(code("USD"), code("EUR"), value, now(), now());
            assert!(
                matches!(result, Err(DomainError::InvalidRateValue(_))),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_observed_at_bounds() {
        let epoch = DateTime::from_timestamp(0, 0).unwrap();
        assert!(matches!(
            Rate::new(code("USD"), code("EUR"), 1.0, epoch, now()),
            Err(DomainError::MissingObservedAt)
        ));

        let within_skew = now() + TimeDelta::minutes(5);
        assert!(Rate::new(code("USD"), code("EUR"), 1.0, within_skew, now()).is_ok());

        let beyond_skew = now() + TimeDelta::minutes(5) + TimeDelta::seconds(1);
        assert!(matches!(
            Rate::new(code("USD"), code("EUR"), 1.0, beyond_skew, now()),
            Err(DomainError::ObservedInFuture(_))
        ));
    }

    #[test]
    fn test_observed_at_truncates_to_seconds() {
        let precise = now() + TimeDelta::milliseconds(750);
        let rate = Rate::new(code("USD"), code("EUR"), 1.0, precise, precise).unwrap();
        assert_eq!(rate.observed_at(), now());
    }

    #[test]
    fn test_to_stale_leaves_original_untouched() {
        let rate = Rate::new(code("USD"), code("EUR"), 0.85, now(), now()).unwrap();
        let stale = rate.to_stale();
        assert!(stale.is_stale());
        assert!(!rate.is_stale());
        assert_eq!(stale.value(), rate.value());
        assert_eq!(stale.observed_at(), rate.observed_at());
    }

    #[test]
    fn test_freshness_boundary_is_half_open() {
        let window = FreshnessWindow::from_secs(3600);
        let observed = now() - TimeDelta::hours(1);
        assert!(!window.is_fresh(observed, now()));
        assert!(window.is_fresh(observed + TimeDelta::seconds(1), now()));
    }

    #[test]
    fn test_non_positive_window_never_stale() {
        let ancient = DateTime::from_timestamp(1, 0).unwrap();
        for window in [FreshnessWindow::from_secs(0), FreshnessWindow::from_secs(-10)] {
            assert!(window.is_fresh(ancient, now()));
            assert_eq!(window.store_ttl(), Duration::ZERO);
        }
    }

    #[test]
    fn test_default_window_is_one_hour() {
        assert_eq!(
            FreshnessWindow::default().store_ttl(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            FreshnessWindow::from_duration(Duration::from_secs(3600)),
            FreshnessWindow::DEFAULT
        );
    }
}
