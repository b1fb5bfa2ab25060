//! # FX Hex
//!
//! Application service layer and HTTP adapter for the exchange rate service.
//!
//! ## Architecture
//!
//! - `service` - Read-through rate cache with stale fallback
//! - `outcome` - Per-call outcome classes and counters
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `S: RateStore` and `P: RateProvider`, allowing
//! different store and upstream implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod outcome;
pub mod service;


pub use outcome::{Outcome, OutcomeCounters};
pub use service::RateService;
