//! Scripted provider for wrapper tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use fx_types::{CurrencyCode, ProviderError, Rate, RateProvider, RequestContext};

pub fn usd_eur() -> (CurrencyCode, CurrencyCode) {
    (
        CurrencyCode::parse("USD").unwrap(),
        CurrencyCode::parse("EUR").unwrap(),
    )
}

/// Replays scripted outcomes; the last one repeats once the script runs out.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<f64, ProviderError>>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<f64, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self::new(vec![Err(err)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<f64, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl RateProvider for ScriptedProvider {
    async fn fetch_one(
        &self,
        _ctx: &RequestContext,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Rate, ProviderError> {
        let value = self.next()?;
        let now = Utc::now();
        Ok(Rate::new(*base, *target, value, now, now).unwrap())
    }

    async fn fetch_all(
        &self,
        ctx: &RequestContext,
        base: &CurrencyCode,
    ) -> Result<Vec<Rate>, ProviderError> {
        let (_, eur) = usd_eur();
        Ok(vec![self.fetch_one(ctx, base, &eur).await?])
    }
}
