//! Simulated exchange venue.
//!
//! Produces synthetic ticks so the pipeline can run end to end without a
//! venue account. Prices fall in `[1000, 1100)` and volumes in
//! `[10000, 11000)`, both with two decimal places.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::application::ports::{MarketDataSource, SourceError};
use crate::domain::observation::{Observation, Symbol};
use crate::infrastructure::config::Credentials;

/// Synthetic exchange source.
pub struct SimulatedExchangeSource {
    name: String,
    credentials: Credentials,
    rng: Mutex<StdRng>,
}

impl SimulatedExchangeSource {
    /// Create a source registered under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            credentials,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a source with a fixed seed for reproducible output.
    #[must_use]
    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            credentials: Credentials::default(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Check whether venue credentials were supplied.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_configured()
    }

    fn tick(&self, symbol: &Symbol, timestamp: DateTime<Utc>) -> Observation {
        let (price_cents, volume_cents) = {
            let mut rng = self.rng.lock();
            (
                rng.random_range(100_000..110_000_i64),
                rng.random_range(1_000_000..1_100_000_i64),
            )
        };

        Observation::new(
            symbol.clone(),
            Decimal::new(price_cents, 2),
            Decimal::new(volume_cents, 2),
            timestamp,
            self.name.as_str(),
        )
    }
}

#[async_trait]
impl MarketDataSource for SimulatedExchangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_current(&self, symbol: &Symbol) -> Result<Vec<Observation>, SourceError> {
        Ok(vec![self.tick(symbol, Utc::now())])
    }

    async fn fetch_range(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, SourceError> {
        if end < start {
            return Err(SourceError::InvalidRange { start, end });
        }

        // One point per hour over [start, end).
        let mut points = Vec::new();
        let mut current = start;
        while current < end {
            points.push(self.tick(symbol, current));
            current += Duration::hours(1);
        }
        Ok(points)
    }
}

impl std::fmt::Debug for SimulatedExchangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedExchangeSource")
            .field("name", &self.name)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observation::validate_batch;
    use chrono::TimeZone;

    #[tokio::test]
    async fn current_tick_is_valid_and_in_range() {
        let source = SimulatedExchangeSource::with_seed("binance", 7);
        let symbol = Symbol::new("BTCUSDT");

        for _ in 0..100 {
            let batch = source.fetch_current(&symbol).await.unwrap();
            assert_eq!(batch.len(), 1);
            validate_batch(&batch).unwrap();

            let tick = &batch[0];
            assert_eq!(tick.source(), "binance");
            assert_eq!(tick.symbol(), &symbol);
            assert!(tick.price() >= Decimal::from(1000) && tick.price() < Decimal::from(1100));
            assert!(tick.volume() >= Decimal::from(10_000) && tick.volume() < Decimal::from(11_000));
        }
    }

    #[tokio::test]
    async fn range_is_hourly_half_open_and_ascending() {
        let source = SimulatedExchangeSource::with_seed("okx", 1);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::hours(3);

        let points = source
            .fetch_range(&Symbol::new("ETHUSDT"), start, end)
            .await
            .unwrap();

        let stamps: Vec<DateTime<Utc>> = points.iter().map(Observation::timestamp).collect();
        assert_eq!(
            stamps,
            vec![start, start + Duration::hours(1), start + Duration::hours(2)]
        );
        assert!(source.fetch_range(&Symbol::new("ETHUSDT"), start, start).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let source = SimulatedExchangeSource::new("okx", Credentials::default());
        let start = Utc::now();

        let err = source
            .fetch_range(&Symbol::new("ETHUSDT"), start, start - Duration::seconds(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRange { .. }));
        assert!(!source.has_credentials());
    }

    #[test]
    fn debug_redacts_credentials() {
        let source = SimulatedExchangeSource::new(
            "binance",
            Credentials::new("key123".to_string(), "secret456".to_string()),
        );
        let debug = format!("{source:?}");
        assert!(debug.contains("binance"));
        assert!(!debug.contains("secret456"));
    }
}
