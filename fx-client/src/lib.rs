//! # FX Client SDK
//!
//! A typed Rust client for the exchange rate API.

use fx_types::{HealthResponse, RateResponse, RatesResponse};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Rates API client.
pub struct RatesClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl RatesClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Fetches the health report, including breaker state and outcome counts.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get("/health").await
    }

    /// Gets the rate for one currency pair.
    pub async fn get_rate(&self, base: &str, target: &str) -> Result<RateResponse, ClientError> {
        self.get(&format!("/api/rates/{}/{}", base, target)).await
    }

    /// Gets every known rate for a base currency.
    pub async fn get_rates(&self, base: &str) -> Result<RatesResponse, ClientError> {
        self.get(&format!("/api/rates/{}", base)).await
    }

    /// Removes a cached pair. Requires an API key.
    pub async fn delete_rate(&self, base: &str, target: &str) -> Result<(), ClientError> {
        let resp = self
            .request(Method::DELETE, &format!("/api/rates/{}/{}", base, target))
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(api_error(resp).await)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.request(Method::GET, path).send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        if resp.status().is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(api_error(resp).await)
        }
    }
}

async fn api_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::get,
    };
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = RatesClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = RatesClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = RatesClient::new("http://localhost:3000").with_api_key("test-key");
        assert_eq!(client.api_key, Some("test-key".to_string()));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_rate_decodes_body() {
        let app = Router::new().route(
            "/api/rates/USD/EUR",
            get(|| async {
                Json(json!({
                    "base": "USD",
                    "target": "EUR",
                    "rate": 0.85,
                    "observed_at": "2024-01-01T00:00:00Z",
                    "stale": false
                }))
            }),
        );
        let client = RatesClient::new(serve(app).await);

        let rate = client.get_rate("USD", "EUR").await.unwrap();

        assert_eq!(rate.base, "USD");
        assert_eq!(rate.rate, 0.85);
        assert!(!rate.stale);
    }

    #[tokio::test]
    async fn test_api_error_carries_message() {
        let app = Router::new().route(
            "/api/rates/USD",
            get(|| async {
                (
                    AxumStatus::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "Exchange rate provider is temporarily unavailable",
                        "code": 503
                    })),
                )
            }),
        );
        let client = RatesClient::new(serve(app).await);

        let err = client.get_rates("USD").await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_delete_sends_bearer_key() {
        let app = Router::new().route(
            "/api/rates/USD/EUR",
            axum::routing::delete(|headers: HeaderMap| async move {
                match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Bearer sk_admin") => AxumStatus::NO_CONTENT,
                    _ => AxumStatus::UNAUTHORIZED,
                }
            }),
        );
        let base = serve(app).await;

        RatesClient::new(&base)
            .with_api_key("sk_admin")
            .delete_rate("USD", "EUR")
            .await
            .unwrap();

        let err = RatesClient::new(&base)
            .delete_rate("USD", "EUR")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}
