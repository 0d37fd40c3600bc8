#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Data Engine - Market Data Ingestion
//!
//! Periodically pulls price/volume observations from named upstream
//! sources, validates them, persists them idempotently and republishes
//! them on a message bus.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Observation type and its validity rules
//!   - `observation`: `Observation`, `Symbol`, validation
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Source, store and publisher interfaces
//!   - `services`: Source registry, ingestion dispatcher, scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `sources`: Simulated exchange venue
//!   - `storage`: turso and in-memory stores
//!   - `bus`: Broadcast message bus
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!  tick ──► Dispatcher ──► Registry ──► Source.fetch_current
//!                │
//!                ├──► validate batch (fail-closed)
//!                ├──► Store.save_observations
//!                └──► Bus.publish_observations   (only after store succeeds)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Observation types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::observation::{
    BatchValidationError, Observation, ObservationField, Symbol, ValidationError, validate,
    validate_batch,
};

// Ports
pub use application::ports::{
    BusError, MarketDataSource, NoOpPublisher, ObservationPublisher, ObservationStore,
    SharedSource, SourceError, StorageError,
};

// Services
pub use application::services::{
    CycleReport, DispatcherSettings, IngestionDispatcher, PairOutcome, Scheduler, SchedulerError,
    SchedulerSettings, SchedulerState, SchedulerStats, SourceRegistry, StopOutcome,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, IngestConfig};

// Adapters
pub use infrastructure::bus::{BroadcastBus, ObservationEnvelope, SharedBroadcastBus};
pub use infrastructure::sources::SimulatedExchangeSource;
pub use infrastructure::storage::{InMemoryObservationStore, TursoObservationStore};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
