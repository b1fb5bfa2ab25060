//! # FX Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store adapter
//! - Build the upstream provider stack around a shared circuit breaker
//! - Create the rate service
//! - Start the expiry sweeper and the HTTP server

mod config;

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use fx_hex::{
    RateService,
    inbound::{ApiKeys, HttpServer, ServerOptions},
};
use fx_provider::{
    Breaker, GuardedProvider, HttpClientConfig, HttpRateClient, RetryPolicy, RetryingProvider,
};
use fx_repo::{Repo, build_repo};
use fx_types::{Clock, SystemClock};

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("fx-service"), provider))
}

/// Installs the global subscriber. Returns the OTel provider when export is on.
fn init_tracing() -> anyhow::Result<Option<sdktrace::SdkTracerProvider>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,fx_app=debug,fx_hex=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let otlp_enabled = std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some();
    let (telemetry, otel_provider) = if otlp_enabled {
        let (tracer, provider) = init_tracer()?;
        (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Some(provider),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(telemetry)
        .init();

    Ok(otel_provider)
}

/// Periodically evicts records past their expiry hint plus `grace`.
fn spawn_sweeper(
    repo: Arc<Repo>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match repo.purge_expired(clock.now(), grace).await {
                Ok(0) => {}
                Ok(evicted) => tracing::debug!(evicted, "expired rates evicted"),
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let otel_provider = init_tracing()?;

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting fx server on port {}", config.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Build store (handles connection and migration)
    let repo = Arc::new(build_repo(&config.database_url, clock.clone()).await?);
    tracing::info!(backend = repo.kind(), "rate store ready");

    // Upstream: HTTP client, retried, behind a breaker shared with /health
    let client = HttpRateClient::with_clock(
        HttpClientConfig {
            base_urls: config.provider_urls.clone(),
            timeout: config.upstream_timeout,
            insecure_skip_verify: config.tls_insecure_skip_verify,
        },
        clock.clone(),
    )?;
    let breaker = Arc::new(Breaker::with_clock(config.breaker, clock.clone()));
    let provider = GuardedProvider::new(
        RetryingProvider::new(client, RetryPolicy::new(config.retry_max_attempts)),
        breaker.clone(),
    );

    let service =
        RateService::with_clock(repo.clone(), provider, config.freshness, clock.clone());

    let sweeper = if config.sweep_interval.is_zero() {
        None
    } else {
        Some(spawn_sweeper(
            repo.clone(),
            clock.clone(),
            config.sweep_interval,
            config.eviction_grace,
        ))
    };

    let api_keys = ApiKeys::new(&config.api_keys);
    if api_keys.is_empty() {
        tracing::warn!("API_KEYS not set: authentication and admin routes disabled");
    }

    // Create and run the HTTP server
    let server = HttpServer::with_options(
        service,
        breaker,
        ServerOptions {
            request_timeout: config.request_timeout,
            requests_per_minute: config.rate_limit_per_minute,
            api_keys,
        },
    );
    let addr = format!("0.0.0.0:{}", config.port);

    let result = server.run(&addr).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    // Ensure traces are flushed before exit
    if let Some(provider) = otel_provider {
        let _ = provider.shutdown();
    }
    result
}
