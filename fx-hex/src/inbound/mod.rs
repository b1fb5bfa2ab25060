//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the rate service.

pub mod auth;
mod handlers;
pub mod rate_limit;
mod server;

pub use auth::ApiKeys;
pub use handlers::{ApiError, AppState};
pub use server::{HttpServer, ServerOptions};
