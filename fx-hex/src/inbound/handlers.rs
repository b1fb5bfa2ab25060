//! HTTP request handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;

use fx_provider::Breaker;
use fx_types::{
    AppError, ErrorResponse, HealthResponse, RateProvider, RateResponse, RateStore,
    RatesResponse, RequestContext,
};

use crate::RateService;
use crate::openapi::ApiDoc;

/// Application state shared across handlers.
pub struct AppState<S: RateStore, P: RateProvider> {
    pub service: RateService<S, P>,
    pub breaker: Arc<Breaker>,
    /// Deadline given to every request context
    pub request_timeout: Duration,
}

impl<S: RateStore, P: RateProvider> AppState<S, P> {
    fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    /// Status code and stable, user-facing text for each error kind.
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "Invalid currency pair: codes must be three letters and differ",
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Exchange rate not found"),
            AppError::CircuitOpen => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Exchange rate provider is temporarily unavailable",
            ),
            AppError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "Request cancelled"),
            AppError::DeadlineExceeded => (StatusCode::REQUEST_TIMEOUT, "Request timed out"),
            AppError::ProviderUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Exchange rate provider unavailable",
            ),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: message.to_string(),
            code: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn health<S: RateStore, P: RateProvider>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        breaker: state.breaker.state().to_string(),
        outcomes: state.service.outcomes().snapshot(),
    })
}

/// Get the rate for one currency pair.
#[tracing::instrument(skip(state))]
pub async fn get_rate<S: RateStore, P: RateProvider>(
    State(state): State<Arc<AppState<S, P>>>,
    Path((base, target)): Path<(String, String)>,
) -> Result<Json<RateResponse>, ApiError> {
    let ctx = state.context();
    let rate = state.service.get_rate(&ctx, &base, &target).await?;
    Ok(Json(RateResponse::from(&rate)))
}

/// Get every known rate for a base currency.
#[tracing::instrument(skip(state))]
pub async fn get_rates<S: RateStore, P: RateProvider>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(base): Path<String>,
) -> Result<Json<RatesResponse>, ApiError> {
    let ctx = state.context();
    let rates = state.service.get_all_rates(&ctx, &base).await?;
    Ok(Json(RatesResponse::from_rates(
        base.trim().to_ascii_uppercase(),
        &rates,
    )))
}

/// Remove a cached pair (administrative).
#[tracing::instrument(skip(state))]
pub async fn delete_rate<S: RateStore, P: RateProvider>(
    State(state): State<Arc<AppState<S, P>>>,
    Path((base, target)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.context();
    state.service.delete_rate(&ctx, &base, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve the OpenAPI document.
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
