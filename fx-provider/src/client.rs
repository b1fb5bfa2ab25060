//! HTTP client for the public currency feed.
//!
//! `GET {base_url}/currencies/{base}.json` answers with
//! `{"date": "...", "{base}": {"{target}": <rate>, ...}}`, everything
//! lowercased. Base URLs are tried in order until one yields a well-formed
//! document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};

use fx_types::{
    Clock, CurrencyCode, ProviderError, Rate, RateProvider, RequestContext, SystemClock,
};

/// Primary upstream: the jsDelivr mirror of the currency feed.
pub const DEFAULT_PRIMARY_URL: &str =
    "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1";

/// Fallback upstream served from Cloudflare Pages.
pub const DEFAULT_FALLBACK_URL: &str = "https://latest.currency-api.pages.dev/v1";

/// Connection settings for [`HttpRateClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Ordered base URLs: primary first, then fallbacks
    pub base_urls: Vec<String>,
    /// Hard cap on every outbound request, whatever the request context allows
    pub timeout: Duration,
    /// Development only. Disables TLS certificate verification.
    pub insecure_skip_verify: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_urls: vec![
                DEFAULT_PRIMARY_URL.to_string(),
                DEFAULT_FALLBACK_URL.to_string(),
            ],
            timeout: Duration::from_secs(10),
            insecure_skip_verify: false,
        }
    }
}

/// Upstream rate provider speaking the currency feed's JSON dialect.
pub struct HttpRateClient {
    http: Client,
    base_urls: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl HttpRateClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: HttpClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        if config.insecure_skip_verify {
            tracing::warn!("TLS certificate verification is disabled for the upstream provider");
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .user_agent(concat!("fx-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_urls: config
                .base_urls
                .into_iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            clock,
        })
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// Fetches the rates object for `base`, walking the base URL list.
    async fn fetch_rates(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Map<String, Value>, ProviderError> {
        let mut last_error = None;

        for base_url in &self.base_urls {
            ctx.check()?;
            let url = format!("{}/currencies/{}.json", base_url, base.to_lowercase());

            match self.attempt(ctx, &url, base).await {
                Ok(rates) => return Ok(rates),
                Err(ProviderError::Context(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(%url, error = %e, "upstream attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Transport {
            message: "no upstream URL configured".into(),
            transient: false,
        }))
    }

    async fn attempt(
        &self,
        ctx: &RequestContext,
        url: &str,
        base: &CurrencyCode,
    ) -> Result<Map<String, Value>, ProviderError> {
        let response = ctx
            .run(self.http.get(url).send())
            .await?
            .map_err(transport_error)?;

        if response.status() != StatusCode::OK {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let body = ctx.run(response.bytes()).await?.map_err(transport_error)?;
        parse_document(&body, base)
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    let transient = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
    ProviderError::Transport {
        message: err.to_string(),
        transient,
    }
}

/// Extracts the rates object from an upstream document.
///
/// The top level must hold `date` plus exactly one other key, the
/// lowercased base currency.
pub fn parse_document(
    body: &[u8],
    base: &CurrencyCode,
) -> Result<Map<String, Value>, ProviderError> {
    let mut document: Map<String, Value> =
        serde_json::from_slice(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    // Informational only; freshness is judged from our own clock.
    if let Some(date) = document.remove("date") {
        tracing::trace!(%date, "upstream document date");
    }

    if document.len() > 1 {
        return Err(ProviderError::Malformed(format!(
            "expected one rates object, found {} top-level keys",
            document.len()
        )));
    }

    match document.remove(&base.to_lowercase()) {
        Some(Value::Object(rates)) => Ok(rates),
        Some(_) => Err(ProviderError::Malformed(format!(
            "rates for {} are not an object",
            base
        ))),
        None => Err(ProviderError::MissingRate(base.to_string())),
    }
}

#[async_trait]
impl RateProvider for HttpRateClient {
    #[tracing::instrument(skip_all, fields(%base, %target))]
    async fn fetch_one(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Rate, ProviderError> {
        if base == target {
            return Err(ProviderError::InvalidInput(format!(
                "base and target are both {}",
                base
            )));
        }

        let rates = self.fetch_rates(ctx, base).await?;
        let value = rates
            .get(&target.to_lowercase())
            .ok_or_else(|| ProviderError::MissingRate(format!("{}/{}", base, target)))?
            .as_f64()
            .ok_or_else(|| ProviderError::Malformed(format!("rate for {} is not a number", target)))?;

        let now = self.clock.now();
        Rate::new(*base, *target, value, now, now)
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    #[tracing::instrument(skip_all, fields(%base))]
    async fn fetch_all(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<Rate>, ProviderError> {
        let rates = self.fetch_rates(ctx, base).await?;
        let now = self.clock.now();

        let mut out: Vec<Rate> = rates
            .iter()
            .filter_map(|(target, value)| {
                let target = CurrencyCode::parse(target).ok()?;
                let value = value.as_f64()?;
                Rate::new(*base, target, value, now, now).ok()
            })
            .collect();
        out.sort_by_key(Rate::target);

        tracing::debug!(count = out.len(), skipped = rates.len() - out.len(), "parsed upstream rates");
        Ok(out)
    }
}
