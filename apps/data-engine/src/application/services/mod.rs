//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SourceRegistry`: Name to source resolution at dispatch time
//! - `IngestionDispatcher`: One symbols × sources sweep with per-pair isolation
//! - `Scheduler`: Tick timer, drop-on-overlap and graceful shutdown

mod dispatcher;
mod registry;
mod scheduler;

pub use dispatcher::{CycleReport, DispatcherSettings, IngestionDispatcher, PairOutcome};
pub use registry::SourceRegistry;
pub use scheduler::{
    Scheduler, SchedulerError, SchedulerSettings, SchedulerState, SchedulerStats, StopOutcome,
};
