//! Per-call outcome classes of the rate service.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use fx_types::OutcomeCounts;

/// How a rate lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from a fresh cached record, upstream untouched
    FreshHit,
    /// Cached data was stale, upstream refreshed it
    StaleRefresh,
    /// Upstream failed, served cached data marked stale
    StaleFallback,
    /// Nothing cached, went to the upstream
    UpstreamMiss,
    /// Rejected before any I/O
    InvalidInput,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::FreshHit => "fresh-hit",
            Outcome::StaleRefresh => "stale-refresh",
            Outcome::StaleFallback => "stale-fallback",
            Outcome::UpstreamMiss => "upstream-miss",
            Outcome::InvalidInput => "invalid-input",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free tally of outcomes since startup.
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    fresh_hit: AtomicU64,
    stale_refresh: AtomicU64,
    stale_fallback: AtomicU64,
    upstream_miss: AtomicU64,
    invalid_input: AtomicU64,
}

impl OutcomeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::FreshHit => &self.fresh_hit,
            Outcome::StaleRefresh => &self.stale_refresh,
            Outcome::StaleFallback => &self.stale_fallback,
            Outcome::UpstreamMiss => &self.upstream_miss,
            Outcome::InvalidInput => &self.invalid_input,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OutcomeCounts {
        OutcomeCounts {
            fresh_hit: self.fresh_hit.load(Ordering::Relaxed),
            stale_refresh: self.stale_refresh.load(Ordering::Relaxed),
            stale_fallback: self.stale_fallback.load(Ordering::Relaxed),
            upstream_miss: self.upstream_miss.load(Ordering::Relaxed),
            invalid_input: self.invalid_input.load(Ordering::Relaxed),
        }
    }
}
