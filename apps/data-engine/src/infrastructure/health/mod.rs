//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, ingestion status reporting, and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (scheduler running)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{CycleReport, Scheduler, SchedulerState, SchedulerStats};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Scheduler status.
    pub scheduler: SchedulerStatus,
    /// Report of the most recent cycle, if any has finished.
    pub last_cycle: Option<CycleReport>,
    /// Registered source names.
    pub sources: Vec<String>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Running and the last cycle had no failures.
    Healthy,
    /// Running but the last cycle had failed pairs.
    Degraded,
    /// Not running.
    Unhealthy,
}

/// Scheduler status.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Lifecycle state.
    pub state: SchedulerState,
    /// Counters since start.
    #[serde(flatten)]
    pub stats: SchedulerStats,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    scheduler: Arc<Scheduler>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, scheduler: Arc<Scheduler>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            scheduler,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.scheduler.state() == SchedulerState::Running {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let scheduler_state = state.scheduler.state();
    let dispatcher = state.scheduler.dispatcher();
    let last_cycle = dispatcher.last_report();

    HealthResponse {
        status: determine_health_status(scheduler_state, last_cycle.as_ref()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        scheduler: SchedulerStatus {
            state: scheduler_state,
            stats: state.scheduler.stats(),
        },
        last_cycle,
        sources: dispatcher.registry().list_names().into_iter().collect(),
    }
}

fn determine_health_status(state: SchedulerState, last_cycle: Option<&CycleReport>) -> HealthStatus {
    match (state, last_cycle) {
        (SchedulerState::Running, Some(report)) if report.failures() > 0 => HealthStatus::Degraded,
        (SchedulerState::Running, _) => HealthStatus::Healthy,
        _ => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NoOpPublisher;
    use crate::application::services::{
        DispatcherSettings, IngestionDispatcher, SchedulerSettings, SourceRegistry,
    };
    use crate::domain::observation::Symbol;
    use crate::infrastructure::sources::SimulatedExchangeSource;
    use crate::infrastructure::storage::InMemoryObservationStore;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use test_case::test_case;
    use tower::ServiceExt;

    fn scheduler(sources: &[&str]) -> Arc<Scheduler> {
        let registry = Arc::new(SourceRegistry::new());
        registry.register("binance", Arc::new(SimulatedExchangeSource::with_seed("binance", 3)));
        let dispatcher = Arc::new(IngestionDispatcher::new(
            registry,
            Arc::new(InMemoryObservationStore::new()),
            Arc::new(NoOpPublisher),
            DispatcherSettings::default(),
        ));
        Arc::new(Scheduler::new(
            dispatcher,
            SchedulerSettings {
                symbols: vec![Symbol::new("BTCUSDT")],
                sources: sources.iter().map(ToString::to_string).collect(),
                interval: Duration::from_secs(60),
            },
        ))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test_case(SchedulerState::Running, None, HealthStatus::Healthy ; "running before first report")]
    #[test_case(SchedulerState::Running, Some(0), HealthStatus::Healthy ; "running clean cycle")]
    #[test_case(SchedulerState::Running, Some(2), HealthStatus::Degraded ; "running with failures")]
    #[test_case(SchedulerState::Idle, None, HealthStatus::Unhealthy ; "idle")]
    #[test_case(SchedulerState::Draining, Some(0), HealthStatus::Unhealthy ; "draining")]
    #[test_case(SchedulerState::Stopped, Some(0), HealthStatus::Unhealthy ; "stopped")]
    fn status_mapping(state: SchedulerState, failures: Option<usize>, expected: HealthStatus) {
        let report = failures.map(|fetch_failed| CycleReport {
            fetch_failed,
            ..CycleReport::default()
        });
        assert_eq!(determine_health_status(state, report.as_ref()), expected);
    }

    #[tokio::test]
    async fn idle_scheduler_is_not_ready() {
        let state = Arc::new(HealthServerState::new("0.1.0".to_string(), scheduler(&["binance"])));

        assert_eq!(get(router(Arc::clone(&state)), "/healthz").await, (StatusCode::OK, "OK".to_string()));
        assert_eq!(
            get(router(Arc::clone(&state)), "/readyz").await,
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY".to_string())
        );
        let (status, _) = get(router(state), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn running_scheduler_reports_last_cycle() {
        let scheduler = scheduler(&["binance", "ghost"]);
        scheduler.start().await.unwrap();
        let state = Arc::new(HealthServerState::new("0.1.0".to_string(), Arc::clone(&scheduler)));

        assert_eq!(
            get(router(Arc::clone(&state)), "/readyz").await,
            (StatusCode::OK, "READY".to_string())
        );

        let (status, body) = get(router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["scheduler"]["state"], "running");
        assert_eq!(json["scheduler"]["cycles_started"], 1);
        assert_eq!(json["last_cycle"]["delivered"], 1);
        assert_eq!(json["last_cycle"]["source_missing"], 1);
        assert_eq!(json["sources"], serde_json::json!(["binance"]));

        scheduler.stop(Duration::from_secs(1)).await;
    }
}
