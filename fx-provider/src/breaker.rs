//! Circuit breaker guarding the upstream rate provider.
//!
//! | From     | Event                                   | To       |
//! |----------|-----------------------------------------|----------|
//! | Closed   | `F`-th failure                          | Open     |
//! | Closed   | success                                 | Closed (counter reset) |
//! | Open     | `admit` before `opened_at + C`          | Open (denied) |
//! | Open     | `admit` at or after `opened_at + C`     | HalfOpen (admitted) |
//! | HalfOpen | `S`-th consecutive success              | Closed   |
//! | HalfOpen | failure                                 | Open (timer reset) |
//!
//! The whole `(state, failures, successes, opened_at)` tuple sits behind one
//! mutex so every transition is indivisible.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use fx_types::{Clock, SystemClock};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Upstream presumed healthy, all calls permitted
    Closed,
    /// Upstream presumed unhealthy, calls denied until the cooldown elapses
    Open,
    /// Probation, probes permitted to decide whether to close or re-open
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerConfigError {
    #[error("failure threshold must be at least 1")]
    FailureThreshold,

    #[error("cooldown must be positive")]
    Cooldown,

    #[error("success threshold must be at least 1")]
    SuccessThreshold,
}

/// Breaker configuration `{F, C, S}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    failure_threshold: u32,
    cooldown: Duration,
    success_threshold: u32,
}

impl BreakerConfig {
    /// Validates and builds a configuration.
    pub fn new(
        failure_threshold: u32,
        cooldown: Duration,
        success_threshold: u32,
    ) -> Result<Self, BreakerConfigError> {
        if failure_threshold == 0 {
            return Err(BreakerConfigError::FailureThreshold);
        }
        if cooldown.is_zero() {
            return Err(BreakerConfigError::Cooldown);
        }
        if success_threshold == 0 {
            return Err(BreakerConfigError::SuccessThreshold);
        }
        Ok(Self {
            failure_threshold,
            cooldown,
            success_threshold,
        })
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<DateTime<Utc>>,
}

/// Three-state failure detector for a single outbound dependency.
///
/// The breaker never decides what a failure is; callers report outcomes.
/// Every `admit() == true` should be paired with one `record_success` or
/// `record_failure`.
pub struct Breaker {
    config: BreakerConfig,
    cooldown: TimeDelta,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl Breaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown: TimeDelta::from_std(config.cooldown).unwrap_or(TimeDelta::MAX),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-transition cannot leave the tuple half-written, so a
        // poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the current state without side effects.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Returns true iff a call may go out right now.
    ///
    /// An Open breaker whose cooldown has elapsed moves to HalfOpen and
    /// admits the caller. HalfOpen admits every caller.
    pub fn admit(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let now = self.clock.now();
                let reopen_at = inner
                    .opened_at
                    .and_then(|at| at.checked_add_signed(self.cooldown));
                match reopen_at {
                    Some(reopen_at) if now < reopen_at => false,
                    _ => {
                        tracing::info!("circuit breaker half-open, probing upstream");
                        inner.state = BreakerState::HalfOpen;
                        inner.success_count = 0;
                        true
                    }
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!("circuit breaker closed");
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            // A late result from a call admitted before the breaker opened.
            BreakerState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(self.clock.now());
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!("circuit breaker probe failed, re-opening");
                inner.state = BreakerState::Open;
                inner.success_count = 0;
                inner.opened_at = Some(self.clock.now());
            }
            BreakerState::Open => {}
        }
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_types::ManualClock;

    fn setup(f: u32, cooldown_ms: u64, s: u32) -> (Breaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let config = BreakerConfig::new(f, Duration::from_millis(cooldown_ms), s).unwrap();
        (Breaker::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_breaker_initial_state() {
        let breaker = Breaker::new(BreakerConfig::default());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.admit());
    }

    #[test]
    fn test_default_config() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold(), 5);
        assert_eq!(config.cooldown(), Duration::from_secs(30));
        assert_eq!(config.success_threshold(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert_eq!(
            BreakerConfig::new(0, Duration::from_secs(1), 1),
            Err(BreakerConfigError::FailureThreshold)
        );
        assert_eq!(
            BreakerConfig::new(1, Duration::ZERO, 1),
            Err(BreakerConfigError::Cooldown)
        );
        assert_eq!(
            BreakerConfig::new(1, Duration::from_secs(1), 0),
            Err(BreakerConfigError::SuccessThreshold)
        );
    }

    #[test]
    fn test_opens_after_threshold() {
        let (breaker, _) = setup(3, 1000, 1);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.admit());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (breaker, _) = setup(2, 1000, 1);

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let (breaker, clock) = setup(2, 50, 1);
        breaker.record_failure();
        breaker.record_failure();

        clock.advance(Duration::from_millis(49));
        assert!(!breaker.admit());
        assert_eq!(breaker.state(), BreakerState::Open);

        clock.advance(Duration::from_millis(1));
        assert!(breaker.admit());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        // HalfOpen admits concurrent probes
        assert!(breaker.admit());
    }

    #[test]
    fn test_closes_after_success_threshold() {
        let (breaker, clock) = setup(1, 50, 2);
        breaker.record_failure();
        clock.advance(Duration::from_millis(60));
        assert!(breaker.admit());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens_with_fresh_timer() {
        let (breaker, clock) = setup(1, 50, 1);
        breaker.record_failure();
        clock.advance(Duration::from_millis(60));
        assert!(breaker.admit());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        clock.advance(Duration::from_millis(40));
        assert!(!breaker.admit());

        clock.advance(Duration::from_millis(10));
        assert!(breaker.admit());
    }

    #[test]
    fn test_late_results_while_open_are_ignored() {
        let (breaker, _) = setup(1, 1000, 1);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_concurrent_bookkeeping_is_consistent() {
        let (breaker, _) = setup(1000, 1000, 1);
        let breaker = Arc::new(breaker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = breaker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if breaker.admit() {
                            breaker.record_failure();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // exactly 800 failures: the 1000th would have opened it
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.lock().failure_count, 800);
    }
}
