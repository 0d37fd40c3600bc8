//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use data_engine::{
    MarketDataSource, Observation, ObservationStore, SourceError, StorageError, Symbol,
};

/// Source answering from a per-symbol script.
pub struct ScriptedSource {
    name: String,
    script: HashMap<String, Result<Vec<Observation>, SourceError>>,
    delay: Duration,
    slow_after: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: HashMap::new(),
            delay: Duration::ZERO,
            slow_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer `symbol` with `batch`.
    pub fn with_batch(mut self, symbol: &str, batch: Vec<Observation>) -> Self {
        self.script.insert(symbol.to_string(), Ok(batch));
        self
    }

    /// Fail every fetch for `symbol`.
    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.script.insert(
            symbol.to_string(),
            Err(SourceError::Upstream {
                venue: self.name.clone(),
                message: "connection reset".to_string(),
            }),
        );
        self
    }

    /// Sleep `delay` on every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer the first `fast_calls` fetches immediately, then sleep `delay`.
    pub fn slow_after(mut self, fast_calls: usize, delay: Duration) -> Self {
        self.slow_after = Some(fast_calls);
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_current(&self, symbol: &Symbol) -> Result<Vec<Observation>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let sleep = match self.slow_after {
            Some(fast) => call >= fast,
            None => !self.delay.is_zero(),
        };
        if sleep {
            tokio::time::sleep(self.delay).await;
        }

        self.script
            .get(symbol.as_str())
            .cloned()
            .unwrap_or_else(|| Ok(vec![tick(symbol.as_str(), &self.name, 100)]))
    }

    async fn fetch_range(
        &self,
        symbol: &Symbol,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, SourceError> {
        self.fetch_current(symbol).await
    }
}

/// Store whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl ObservationStore for FailingStore {
    async fn save_observations(&self, _observations: &[Observation]) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Connection {
            message: "database is locked".to_string(),
        })
    }

    async fn latest(&self, _symbol: &Symbol, _limit: usize) -> Result<Vec<Observation>, StorageError> {
        Ok(vec![])
    }

    async fn range(
        &self,
        _symbol: &Symbol,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError> {
        Ok(vec![])
    }
}

/// A valid observation with a fresh id.
pub fn tick(symbol: &str, source: &str, price: i64) -> Observation {
    Observation::new(symbol, Decimal::from(price), Decimal::from(10), Utc::now(), source)
}

/// Three valid observations at fixed minutes.
pub fn three_ticks(symbol: &str, source: &str) -> Vec<Observation> {
    (0..3)
        .map(|minute| {
            Observation::with_id(
                format!("{source}-{symbol}-{minute}"),
                symbol,
                Decimal::new(6_700_000 + i64::from(minute), 2),
                Decimal::new(125, 2),
                Utc.with_ymd_and_hms(2024, 6, 1, 9, minute, 0).unwrap(),
                source,
            )
        })
        .collect()
}

pub fn symbols(names: &[&str]) -> Vec<Symbol> {
    names.iter().map(|s| Symbol::new(*s)).collect()
}

pub fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

pub fn shared<S: MarketDataSource + 'static>(source: S) -> Arc<S> {
    Arc::new(source)
}
