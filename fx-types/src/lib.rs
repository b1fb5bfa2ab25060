//! # FX Types
//!
//! Domain types and port traits for the exchange rate service.
//! This crate performs no I/O - only data structures, business rules,
//! and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (CurrencyCode, Rate, RateRecord)
//! - `ports/` - Trait definitions that adapters must implement
//! - `context` - Request cancellation and deadlines
//! - `clock` - Wall-clock abstraction
//! - `dto` - Data Transfer Objects for API boundaries
//! - `error` - Domain and application error types

pub mod clock;
pub mod context;
pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{CancelHandle, ContextError, RequestContext};
pub use domain::{CurrencyCode, FreshnessWindow, Rate, RateRecord, record_key};
pub use dto::*;
pub use error::{AppError, DomainError, StoreError};
pub use ports::{ProviderError, RateProvider, RateStore};
