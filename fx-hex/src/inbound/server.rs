//! HTTP Server configuration and startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use fx_provider::Breaker;
use fx_types::{RateProvider, RateStore};

use super::auth::{ApiKeys, auth_middleware};
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::RateService;

/// Tunables for the HTTP adapter.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Deadline for each request context
    pub request_timeout: Duration,
    /// Token bucket size per client per minute
    pub requests_per_minute: u32,
    /// Empty disables authentication and the admin routes
    pub api_keys: ApiKeys,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            requests_per_minute: 100,
            api_keys: ApiKeys::default(),
        }
    }
}

/// HTTP Server for the Rates API.
pub struct HttpServer<S: RateStore, P: RateProvider> {
    state: Arc<AppState<S, P>>,
    rate_limiter: Arc<RateLimiterState>,
    api_keys: Arc<ApiKeys>,
}

impl<S: RateStore, P: RateProvider> HttpServer<S, P> {
    /// Creates a new HTTP server with default options.
    pub fn new(service: RateService<S, P>, breaker: Arc<Breaker>) -> Self {
        Self::with_options(service, breaker, ServerOptions::default())
    }

    pub fn with_options(
        service: RateService<S, P>,
        breaker: Arc<Breaker>,
        options: ServerOptions,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                breaker,
                request_timeout: options.request_timeout,
            }),
            rate_limiter: Arc::new(
                RateLimiterState::new(options.requests_per_minute, Duration::from_secs(60))
                    .keyed_by_api_key(!options.api_keys.is_empty()),
            ),
            api_keys: Arc::new(options.api_keys),
        }
    }

    /// Shared state, for callers that need the service or breaker.
    pub fn state(&self) -> &Arc<AppState<S, P>> {
        &self.state
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        let mut router = Router::new()
            .route("/health", get(handlers::health::<S, P>))
            .route("/api-docs/openapi.json", get(handlers::openapi_json))
            .route("/api/rates/{base}", get(handlers::get_rates::<S, P>));

        router = if self.api_keys.is_empty() {
            router.route("/api/rates/{base}/{target}", get(handlers::get_rate::<S, P>))
        } else {
            router.route(
                "/api/rates/{base}/{target}",
                get(handlers::get_rate::<S, P>).delete(handlers::delete_rate::<S, P>),
            )
        };

        let cors = CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_origin(Any)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

        router
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.api_keys.clone(),
                auth_middleware,
            ))
            .layer(cors)
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::REFERRER_POLICY,
                HeaderValue::from_static("no-referrer"),
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
