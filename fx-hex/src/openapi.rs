//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use fx_types::dto::{ErrorResponse, HealthResponse, OutcomeCounts, RateResponse, RatesResponse};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
async fn health() {}

/// Get the rate for one currency pair
#[utoipa::path(
    get,
    path = "/api/rates/{base}/{target}",
    tag = "rates",
    security((), ("bearer_auth" = [])),
    params(
        ("base" = String, Path, description = "Base currency code (ISO 4217)", example = "USD"),
        ("target" = String, Path, description = "Target currency code (ISO 4217)", example = "EUR")
    ),
    responses(
        (status = 200, description = "Current or stale-fallback rate", body = RateResponse),
        (status = 400, description = "Malformed or identical currency codes", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Upstream has no rate for the pair", body = ErrorResponse),
        (status = 408, description = "Request deadline exceeded", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Upstream failed and nothing is cached", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open and nothing is cached", body = ErrorResponse)
    )
)]
async fn get_rate() {}

/// Get every known rate for a base currency
#[utoipa::path(
    get,
    path = "/api/rates/{base}",
    tag = "rates",
    security((), ("bearer_auth" = [])),
    params(
        ("base" = String, Path, description = "Base currency code (ISO 4217)", example = "USD")
    ),
    responses(
        (status = 200, description = "Rates keyed by target code", body = RatesResponse),
        (status = 400, description = "Malformed currency code", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Upstream failed and nothing is cached", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open and nothing is cached", body = ErrorResponse)
    )
)]
async fn get_rates() {}

/// Remove a cached pair (only routed when API keys are configured)
#[utoipa::path(
    delete,
    path = "/api/rates/{base}/{target}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("base" = String, Path, description = "Base currency code (ISO 4217)"),
        ("target" = String, Path, description = "Target currency code (ISO 4217)")
    ),
    responses(
        (status = 204, description = "Cached rate removed"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Nothing cached for the pair", body = ErrorResponse)
    )
)]
async fn delete_rate() {}

/// OpenAPI documentation for the Rates API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FX Rate Service API",
        version = "1.0.0",
        description = "Currency exchange rates served from a read-through cache in front of an upstream provider.\n\nWhen the upstream is failing, the last known rate is returned with `stale: true`.\n\n## Authentication\n\nWhen the server is configured with API keys, include one in the `Authorization` header:\n\n```\nAuthorization: Bearer <api_key>\n```",
        license(name = "MIT"),
    ),
    paths(health, get_rate, get_rates, delete_rate),
    components(
        schemas(
            RateResponse,
            RatesResponse,
            HealthResponse,
            OutcomeCounts,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rates", description = "Exchange rate lookups"),
        (name = "admin", description = "Cache administration"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for Bearer token authentication.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
