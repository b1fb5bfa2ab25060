//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use fx_types::ErrorResponse;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Configured API keys, held only as SHA-256 hashes.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    hashes: Vec<String>,
}

impl ApiKeys {
    /// Hashes the raw keys; blank entries are ignored.
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Self {
            hashes: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_string())
                .filter(|k| !k.is_empty())
                .map(|k| hash_api_key(&k))
                .collect(),
        }
    }

    /// No keys means authentication is disabled.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Constant-time check against every configured hash.
    pub fn verify(&self, key: &str) -> bool {
        let input_hash = hash_api_key(key);
        self.hashes.iter().fold(false, |found, stored| {
            let matched: bool = input_hash.as_bytes().ct_eq(stored.as_bytes()).into();
            found | matched
        })
    }
}

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
pub(crate) fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Authentication middleware that validates API keys.
///
/// Passes everything through when no keys are configured. `/health` and the
/// OpenAPI document are always public.
pub async fn auth_middleware(
    State(keys): State<Arc<ApiKeys>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if keys.is_empty() || is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() && keys.verify(key) => next.run(request).await,
        Some(key) if !key.is_empty() => unauthorized_response("Invalid API key"),
        _ => unauthorized_response("Missing or invalid Authorization header"),
    }
}

pub(crate) fn is_public(path: &str) -> bool {
    path == "/health" || path == "/api-docs/openapi.json"
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
            code: 401,
        }),
    )
        .into_response()
}
