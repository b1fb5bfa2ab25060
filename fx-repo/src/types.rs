//! Shared database row type and helpers for the SQL adapters.

use sqlx::FromRow;

use fx_types::{RateRecord, StoreError};

/// Rate row from the `rates` table.
#[derive(FromRow)]
pub struct DbRate {
    pub pk: String,
    pub base: String,
    pub target: String,
    pub rate: f64,
    pub timestamp: i64,
    pub stale: bool,
    pub ttl: Option<i64>,
}

impl DbRate {
    pub fn into_record(self) -> RateRecord {
        RateRecord {
            key: self.pk,
            base: self.base,
            target: self.target,
            value: self.rate,
            observed_at_epoch_seconds: self.timestamp,
            stale: self.stale,
            store_expiry_epoch_seconds: self.ttl,
        }
    }
}

pub fn db_err(e: sqlx::Error) -> StoreError {
    tracing::error!(error = %e, "database error");
    StoreError::Database(e.to_string())
}
