//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Cycles**: Cycles run, ticks dropped on overlap, cycle duration
//! - **Pairs**: Outcome of every `(symbol, source)` pair by label
//! - **Throughput**: Observations written to the store and published
//! - **Lifecycle**: Scheduler state and registered source count
//!
//! Recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade discards samples until a recorder is installed.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::services::{CycleReport, SchedulerState};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!("data_engine_cycles_total", "Total dispatch cycles run");
    describe_counter!(
        "data_engine_ticks_dropped_total",
        "Ticks dropped because the previous cycle was still running"
    );
    describe_histogram!(
        "data_engine_cycle_duration_seconds",
        "Wall-clock duration of one dispatch cycle"
    );

    describe_counter!(
        "data_engine_pair_outcomes_total",
        "Outcome of each (symbol, source) pair by source and outcome"
    );

    describe_counter!(
        "data_engine_observations_stored_total",
        "Observations written to the store"
    );
    describe_counter!(
        "data_engine_observations_published_total",
        "Observations published on the bus"
    );

    describe_gauge!(
        "data_engine_scheduler_state",
        "Scheduler state (0 idle, 1 running, 2 draining, 3 stopped)"
    );
    describe_gauge!(
        "data_engine_registered_sources",
        "Number of registered data sources"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the outcome of one pair.
pub fn record_pair_outcome(source: &str, outcome: &'static str) {
    counter!(
        "data_engine_pair_outcomes_total",
        "source" => source.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a finished cycle.
pub fn record_cycle(duration: Duration, report: &CycleReport) {
    counter!("data_engine_cycles_total").increment(1);
    histogram!("data_engine_cycle_duration_seconds").record(duration.as_secs_f64());
    counter!("data_engine_observations_stored_total").increment(report.observations_stored as u64);
    counter!("data_engine_observations_published_total")
        .increment(report.observations_published as u64);
}

/// Record a tick dropped on overlap.
pub fn record_tick_dropped() {
    counter!("data_engine_ticks_dropped_total").increment(1);
}

/// Update the scheduler state gauge.
pub fn set_scheduler_state(state: SchedulerState) {
    gauge!("data_engine_scheduler_state").set(state_value(state));
}

/// Update the registered source gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_registered_sources(count: usize) {
    gauge!("data_engine_registered_sources").set(count as f64);
}

const fn state_value(state: SchedulerState) -> f64 {
    match state {
        SchedulerState::Idle => 0.0,
        SchedulerState::Running => 1.0,
        SchedulerState::Draining => 2.0,
        SchedulerState::Stopped => 3.0,
    }
}

// =============================================================================
// Tests
// =============================================================================
