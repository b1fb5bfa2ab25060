//! Configuration loading from environment.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use fx_provider::{BreakerConfig, DEFAULT_FALLBACK_URL, DEFAULT_PRIMARY_URL};
use fx_types::FreshnessWindow;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub provider_urls: Vec<String>,
    pub freshness: FreshnessWindow,
    pub breaker: BreakerConfig,
    pub retry_max_attempts: u32,
    pub upstream_timeout: Duration,
    pub request_timeout: Duration,
    pub tls_insecure_skip_verify: bool,
    pub api_keys: Vec<String>,
    pub rate_limit_per_minute: u32,
    /// Zero disables the sweeper
    pub sweep_interval: Duration,
    pub eviction_grace: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider_urls = match var("PROVIDER_URLS") {
            Some(raw) => split_list(&raw),
            None => vec![
                DEFAULT_PRIMARY_URL.to_string(),
                DEFAULT_FALLBACK_URL.to_string(),
            ],
        };
        if provider_urls.is_empty() {
            anyhow::bail!("PROVIDER_URLS must name at least one base URL");
        }

        let failure_threshold = parse(&var, "BREAKER_FAILURE_THRESHOLD", 5u32)?;
        let cooldown_ms = parse(&var, "BREAKER_COOLDOWN_MS", 30_000u64)?;
        let success_threshold = parse(&var, "BREAKER_SUCCESS_THRESHOLD", 1u32)?;
        let breaker = BreakerConfig::new(
            failure_threshold,
            Duration::from_millis(cooldown_ms),
            success_threshold,
        )
        .context("invalid BREAKER_* configuration")?;

        let retry_max_attempts = parse(&var, "RETRY_MAX_ATTEMPTS", 3u32)?;
        if retry_max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            port: parse(&var, "PORT", 3000u16)?,
            database_url: var("DATABASE_URL").unwrap_or_else(|| "memory://".to_string()),
            provider_urls,
            freshness: FreshnessWindow::from_secs(parse(&var, "CACHE_TTL_SECS", 3600i64)?),
            breaker,
            retry_max_attempts,
            upstream_timeout: Duration::from_secs(parse(&var, "UPSTREAM_TIMEOUT_SECS", 10u64)?),
            request_timeout: Duration::from_secs(parse(&var, "REQUEST_TIMEOUT_SECS", 15u64)?),
            tls_insecure_skip_verify: parse(&var, "TLS_INSECURE_SKIP_VERIFY", false)?,
            api_keys: var("API_KEYS").map(|raw| split_list(&raw)).unwrap_or_default(),
            rate_limit_per_minute: parse(&var, "RATE_LIMIT_PER_MINUTE", 100u32)?,
            sweep_interval: Duration::from_secs(parse(&var, "STORE_SWEEP_INTERVAL_SECS", 300u64)?),
            eviction_grace: Duration::from_secs(parse(
                &var,
                "STORE_EVICTION_GRACE_SECS",
                86_400u64,
            )?),
        })
    }
}

fn parse<T, V>(var: &V, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {} value {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
