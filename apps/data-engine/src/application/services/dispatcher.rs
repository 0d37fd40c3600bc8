//! Ingestion Dispatcher
//!
//! Runs one scheduling cycle: for every `(symbol, source)` pair it resolves
//! the source, fetches the current observations, validates the whole batch
//! and fans it out to the store and then the bus.
//!
//! # Failure policy
//!
//! Every pair is isolated. A missing source, a failed or timed out fetch, an
//! empty batch, a rejected batch or a failed sink call is logged and counted
//! in the [`CycleReport`]; the cycle always moves on to the next pair.
//!
//! - Batches are fail-closed: one invalid observation drops the whole batch
//!   for both sinks.
//! - The store is the source of truth. When the store write fails the bus
//!   is not called for that pair.
//! - A bus failure after a successful store write is logged only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, future, stream};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::registry::SourceRegistry;
use crate::application::ports::{
    BusError, ObservationPublisher, ObservationStore, SourceError, StorageError,
};
use crate::domain::observation::{BatchValidationError, Observation, Symbol, validate_batch};
use crate::infrastructure::metrics;

// =============================================================================
// Settings
// =============================================================================

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    /// Upper bound on a single upstream fetch.
    pub fetch_timeout: Duration,
    /// Number of pairs processed concurrently (1 = sequential, in order).
    pub max_concurrent_pairs: usize,
    /// Span of history fetched and stored per backfill batch.
    pub backfill_window: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_pairs: 1,
            backfill_window: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of dispatching one `(symbol, source)` pair.
#[derive(Debug, Clone)]
pub enum PairOutcome {
    /// Batch reached both sinks.
    Delivered {
        /// Number of observations delivered.
        count: usize,
    },
    /// No source registered under the requested name.
    SourceMissing,
    /// Upstream fetch failed or timed out.
    FetchFailed(SourceError),
    /// Upstream returned no observations.
    Empty,
    /// Batch contained an invalid observation and was dropped.
    Rejected(BatchValidationError),
    /// Store write failed; the bus was skipped.
    StoreFailed(StorageError),
    /// Store write succeeded but bus publish failed.
    BusFailed {
        /// Number of observations stored.
        stored: usize,
        /// Publish error.
        error: BusError,
    },
    /// Pair was not started because the cycle was cancelled.
    Skipped,
}

impl PairOutcome {
    /// Metric label for the outcome.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::SourceMissing => "source_missing",
            Self::FetchFailed(_) => "fetch_failed",
            Self::Empty => "empty",
            Self::Rejected(_) => "rejected",
            Self::StoreFailed(_) => "store_failed",
            Self::BusFailed { .. } => "bus_failed",
            Self::Skipped => "skipped",
        }
    }

    /// Check whether the outcome counts as a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing
                | Self::FetchFailed(_)
                | Self::Rejected(_)
                | Self::StoreFailed(_)
                | Self::BusFailed { .. }
        )
    }
}

/// Tally of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Pairs that were started.
    pub pairs: usize,
    /// Pairs whose batch reached both sinks.
    pub delivered: usize,
    /// Pairs whose source was not registered.
    pub source_missing: usize,
    /// Pairs whose fetch failed.
    pub fetch_failed: usize,
    /// Pairs whose fetch returned nothing.
    pub empty: usize,
    /// Pairs whose batch failed validation.
    pub rejected: usize,
    /// Pairs whose store write failed.
    pub store_failed: usize,
    /// Pairs whose bus publish failed.
    pub bus_failed: usize,
    /// Pairs not started because of cancellation.
    pub skipped: usize,
    /// Observations written to the store.
    pub observations_stored: usize,
    /// Observations published on the bus.
    pub observations_published: usize,
    /// Wall-clock duration of the cycle in milliseconds.
    pub duration_ms: u64,
}

impl CycleReport {
    /// Count failed pairs.
    #[must_use]
    pub const fn failures(&self) -> usize {
        self.source_missing + self.fetch_failed + self.rejected + self.store_failed + self.bus_failed
    }

    fn record(&mut self, outcome: &PairOutcome) {
        match outcome {
            PairOutcome::Skipped => {
                self.skipped += 1;
                return;
            }
            PairOutcome::Delivered { count } => {
                self.delivered += 1;
                self.observations_stored += count;
                self.observations_published += count;
            }
            PairOutcome::SourceMissing => self.source_missing += 1,
            PairOutcome::FetchFailed(_) => self.fetch_failed += 1,
            PairOutcome::Empty => self.empty += 1,
            PairOutcome::Rejected(_) => self.rejected += 1,
            PairOutcome::StoreFailed(_) => self.store_failed += 1,
            PairOutcome::BusFailed { stored, .. } => {
                self.bus_failed += 1;
                self.observations_stored += stored;
            }
        }
        self.pairs += 1;
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Fans fetched observations out to the store and the bus.
pub struct IngestionDispatcher {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn ObservationStore>,
    publisher: Arc<dyn ObservationPublisher>,
    settings: DispatcherSettings,
    cycles_run: AtomicU64,
    last_report: Mutex<Option<CycleReport>>,
}

impl IngestionDispatcher {
    /// Create a dispatcher over the given registry and sinks.
    #[must_use]
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<dyn ObservationStore>,
        publisher: Arc<dyn ObservationPublisher>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            registry,
            store,
            publisher,
            settings,
            cycles_run: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    /// The registry sources are resolved from.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Number of cycles started since creation.
    #[must_use]
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(Ordering::Relaxed)
    }

    /// Report of the most recently finished cycle.
    #[must_use]
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().clone()
    }

    /// Run one sweep over `symbols × sources`.
    ///
    /// Symbols form the outer loop and sources the inner loop, both in the
    /// order given. Per-pair failures never escape; they are tallied in the
    /// returned report. Cancellation is observed between pairs.
    pub async fn run_cycle(
        &self,
        symbols: &[Symbol],
        sources: &[String],
        cancel: &CancellationToken,
    ) -> CycleReport {
        let started = Instant::now();
        let cycle = self.cycles_run.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(
            cycle,
            symbols = symbols.len(),
            sources = sources.len(),
            "Processing market data"
        );

        // Owned pairs keep the cycle future `Send` when spawned.
        let pairs: Vec<(Symbol, String)> = symbols
            .iter()
            .flat_map(|symbol| sources.iter().map(move |source| (symbol.clone(), source.clone())))
            .collect();
        let total = pairs.len();

        let outcomes: Vec<(String, PairOutcome)> = stream::iter(pairs)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(symbol, source)| async move {
                let outcome = self.dispatch_pair(&symbol, &source).await;
                (source, outcome)
            })
            .buffer_unordered(self.settings.max_concurrent_pairs.max(1))
            .collect()
            .await;

        let mut report = CycleReport::default();
        for (source, outcome) in &outcomes {
            metrics::record_pair_outcome(source, outcome.as_str());
            report.record(outcome);
        }
        for _ in outcomes.len()..total {
            report.record(&PairOutcome::Skipped);
        }

        let elapsed = started.elapsed();
        report.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        metrics::record_cycle(elapsed, &report);

        if report.skipped > 0 {
            tracing::warn!(cycle, skipped = report.skipped, "Cycle cancelled before all pairs ran");
        }
        tracing::info!(
            cycle,
            delivered = report.delivered,
            failures = report.failures(),
            stored = report.observations_stored,
            published = report.observations_published,
            duration_ms = report.duration_ms,
            "Market data processing completed"
        );

        *self.last_report.lock() = Some(report.clone());
        report
    }

    /// Fetch a historical range from one source and fan it out like a tick.
    ///
    /// The range is walked in `backfill_window` slices, each fetched, stored
    /// and published as its own batch. Applies the same validation and
    /// store-before-bus policy as a cycle. The first slice that does not
    /// deliver (empty slices aside) ends the backfill with its outcome;
    /// slices before it stay stored.
    pub async fn backfill(
        &self,
        symbol: &Symbol,
        source_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PairOutcome {
        let Some(source) = self.registry.resolve(source_name) else {
            tracing::warn!(symbol = %symbol, source = source_name, "Data source not found");
            return PairOutcome::SourceMissing;
        };

        let step = TimeDelta::from_std(self.settings.backfill_window)
            .ok()
            .filter(|step| *step > TimeDelta::zero());

        let mut delivered = 0;
        let mut window_start = start;
        loop {
            let window_end = step
                .and_then(|step| window_start.checked_add_signed(step))
                .map_or(end, |t| t.min(end));

            let fetched = tokio::time::timeout(
                self.settings.fetch_timeout,
                source.fetch_range(symbol, window_start, window_end),
            )
            .await;
            let batch = match self.settle_fetch(fetched, source_name) {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(symbol = %symbol, source = source_name, error = %e, "Failed to get historical data");
                    return PairOutcome::FetchFailed(e);
                }
            };

            match self.fan_out(symbol, source_name, batch).await {
                PairOutcome::Delivered { count } => delivered += count,
                PairOutcome::Empty => {}
                other => return other,
            }

            if window_end >= end {
                break;
            }
            window_start = window_end;
        }

        tracing::info!(symbol = %symbol, source = source_name, count = delivered, "Historical data backfilled");
        if delivered == 0 {
            PairOutcome::Empty
        } else {
            PairOutcome::Delivered { count: delivered }
        }
    }

    async fn dispatch_pair(&self, symbol: &Symbol, source_name: &str) -> PairOutcome {
        let Some(source) = self.registry.resolve(source_name) else {
            tracing::warn!(symbol = %symbol, source = source_name, "Data source not found");
            return PairOutcome::SourceMissing;
        };

        let fetched =
            tokio::time::timeout(self.settings.fetch_timeout, source.fetch_current(symbol)).await;
        match self.settle_fetch(fetched, source_name) {
            Ok(batch) => self.fan_out(symbol, source_name, batch).await,
            Err(e) => {
                tracing::error!(symbol = %symbol, source = source_name, error = %e, "Failed to get market data");
                PairOutcome::FetchFailed(e)
            }
        }
    }

    fn settle_fetch(
        &self,
        fetched: Result<Result<Vec<Observation>, SourceError>, tokio::time::error::Elapsed>,
        source_name: &str,
    ) -> Result<Vec<Observation>, SourceError> {
        fetched.unwrap_or_else(|_| {
            Err(SourceError::Timeout {
                venue: source_name.to_string(),
                timeout_ms: u64::try_from(self.settings.fetch_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            })
        })
    }

    async fn fan_out(
        &self,
        symbol: &Symbol,
        source_name: &str,
        batch: Vec<Observation>,
    ) -> PairOutcome {
        if batch.is_empty() {
            tracing::info!(symbol = %symbol, source = source_name, "No market data received");
            return PairOutcome::Empty;
        }

        if let Err(e) = validate_batch(&batch) {
            tracing::warn!(
                symbol = %symbol,
                source = source_name,
                batch_size = batch.len(),
                error = %e,
                "Rejected market data batch"
            );
            return PairOutcome::Rejected(e);
        }

        if let Err(e) = self.store.save_observations(&batch).await {
            tracing::error!(
                symbol = %symbol,
                source = source_name,
                batch_size = batch.len(),
                error = %e,
                "Failed to save market data, skipping bus"
            );
            return PairOutcome::StoreFailed(e);
        }

        if let Err(error) = self.publisher.publish_observations(&batch).await {
            tracing::warn!(
                symbol = %symbol,
                source = source_name,
                batch_size = batch.len(),
                error = %error,
                "Failed to publish market data"
            );
            return PairOutcome::BusFailed {
                stored: batch.len(),
                error,
            };
        }

        tracing::debug!(symbol = %symbol, source = source_name, count = batch.len(), "Market data delivered");
        PairOutcome::Delivered { count: batch.len() }
    }
}

impl std::fmt::Debug for IngestionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionDispatcher")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("cycles_run", &self.cycles_run())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
