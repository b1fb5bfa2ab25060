//! Domain models for the exchange rate service.

pub mod currency;
pub mod rate;
pub mod record;

pub use currency::CurrencyCode;
pub use rate::{FreshnessWindow, MAX_CLOCK_SKEW, Rate};
pub use record::{KEY_PREFIX, RateRecord, record_key};
