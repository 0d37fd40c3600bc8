//! Scheduler
//!
//! Drives the dispatcher on a fixed interval.
//!
//! # Lifecycle
//!
//! `Idle → Running → Draining → Stopped`, strictly linear.
//!
//! - `start` runs one cycle immediately and only then spawns the tick loop,
//!   so the first periodic tick fires one interval after the startup cycle.
//! - At most one cycle runs at a time. A tick that finds the previous cycle
//!   still in flight is dropped and counted, never queued.
//! - `stop` cancels the loop, waits up to a grace period for the in-flight
//!   cycle and aborts it when the grace period runs out.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::dispatcher::IngestionDispatcher;
use crate::domain::observation::Symbol;
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// What to sweep and how often.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Symbols swept every cycle, in order.
    pub symbols: Vec<Symbol>,
    /// Source names swept for every symbol, in order.
    pub sources: Vec<String>,
    /// Time between ticks.
    pub interval: Duration,
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Created, not started.
    Idle,
    /// Ticking.
    Running,
    /// Stop requested, waiting for the in-flight cycle.
    Draining,
    /// Terminal.
    Stopped,
}

impl SchedulerState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `stop` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Loop and in-flight cycle finished within the grace period.
    Graceful,
    /// Grace period elapsed; remaining work was aborted.
    Forced,
    /// Scheduler was not running.
    NotRunning,
}

/// Counters since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Cycles started, including the startup cycle.
    pub cycles_started: u64,
    /// Ticks dropped because a cycle was still running.
    pub ticks_dropped: u64,
}

/// Lifecycle misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// `start` called outside `Idle`.
    #[error("scheduler cannot start from state {state}")]
    InvalidState {
        /// State at the time of the call.
        state: SchedulerState,
    },

    /// Tick interval is zero.
    #[error("scheduler interval must be greater than zero")]
    ZeroInterval,
}

// =============================================================================
// Scheduler
// =============================================================================

struct Shared {
    dispatcher: Arc<IngestionDispatcher>,
    settings: SchedulerSettings,
    guard: Arc<Semaphore>,
    cancel: CancellationToken,
    cycles_started: AtomicU64,
    ticks_dropped: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl Shared {
    async fn run_cycle(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.dispatcher
            .run_cycle(&self.settings.symbols, &self.settings.sources, &self.cancel)
            .await;
    }

    /// Run one cycle on its own task, registered so a forced stop can abort it.
    fn spawn_cycle(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        let task = tokio::spawn(async move {
            shared.run_cycle().await;
            drop(permit);
        });
        *self.in_flight.lock() = Some(task.abort_handle());
        task
    }

    async fn tick_loop(self: Arc<Self>) {
        let period = self.settings.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Ok(permit) = Arc::clone(&self.guard).try_acquire_owned() else {
                let dropped = self.ticks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_tick_dropped();
                tracing::warn!(dropped, "Previous cycle still running, skipping tick");
                continue;
            };

            // Detached; `stop` reaches it through `in_flight`.
            drop(self.spawn_cycle(permit));
        }

        tracing::debug!("Scheduler tick loop exited");
    }
}

/// Periodic driver for the [`IngestionDispatcher`].
pub struct Scheduler {
    shared: Arc<Shared>,
    state: Mutex<SchedulerState>,
    tick_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new(dispatcher: Arc<IngestionDispatcher>, settings: SchedulerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                settings,
                guard: Arc::new(Semaphore::new(1)),
                cancel: CancellationToken::new(),
                cycles_started: AtomicU64::new(0),
                ticks_dropped: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            }),
            state: Mutex::new(SchedulerState::Idle),
            tick_loop: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_started: self.shared.cycles_started.load(Ordering::Relaxed),
            ticks_dropped: self.shared.ticks_dropped.load(Ordering::Relaxed),
        }
    }

    /// Token cancelled when `stop` is called.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// The dispatcher this scheduler drives.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<IngestionDispatcher> {
        &self.shared.dispatcher
    }

    /// Start ticking.
    ///
    /// Runs the startup cycle to completion before returning.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidState`] unless the scheduler is idle,
    /// and [`SchedulerError::ZeroInterval`] for a zero interval.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.shared.settings.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        self.transition_to_running()?;

        let settings = &self.shared.settings;
        tracing::info!(
            interval_ms = u64::try_from(settings.interval.as_millis()).unwrap_or(u64::MAX),
            symbols = settings.symbols.len(),
            sources = settings.sources.len(),
            "Starting data engine scheduler"
        );

        if let Ok(permit) = Arc::clone(&self.shared.guard).try_acquire_owned() {
            match self.shared.spawn_cycle(permit).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    tracing::warn!("Startup cycle aborted by stop");
                }
                Err(e) => tracing::error!(error = %e, "Startup cycle panicked"),
            }
        }

        let mut tick_loop = self.tick_loop.lock();
        if self.shared.cancel.is_cancelled() {
            return Ok(());
        }
        *tick_loop = Some(tokio::spawn(Arc::clone(&self.shared).tick_loop()));
        Ok(())
    }

    /// Stop ticking and drain.
    ///
    /// Waits up to `grace` for the tick loop and the in-flight cycle. Work
    /// still running after that is aborted.
    pub async fn stop(&self, grace: Duration) -> StopOutcome {
        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Idle => {
                    *state = SchedulerState::Stopped;
                    metrics::set_scheduler_state(SchedulerState::Stopped);
                    return StopOutcome::NotRunning;
                }
                SchedulerState::Draining | SchedulerState::Stopped => {
                    return StopOutcome::NotRunning;
                }
                SchedulerState::Running => *state = SchedulerState::Draining,
            }
        }
        metrics::set_scheduler_state(SchedulerState::Draining);

        let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(grace_ms, "Stopping data engine scheduler");
        self.shared.cancel.cancel();

        let mut tick_loop = self.tick_loop.lock().take();
        let drained = tokio::time::timeout(grace, async {
            if let Some(handle) = tick_loop.as_mut() {
                let _ = handle.await;
            }
            let _ = self.shared.guard.acquire().await;
        })
        .await;

        let outcome = if drained.is_ok() {
            tracing::info!("Scheduler stopped gracefully");
            StopOutcome::Graceful
        } else {
            if let Some(handle) = tick_loop {
                handle.abort();
            }
            if let Some(in_flight) = self.shared.in_flight.lock().take() {
                in_flight.abort();
            }
            tracing::warn!(grace_ms, "Grace period elapsed, aborted in-flight cycle");
            StopOutcome::Forced
        };

        *self.state.lock() = SchedulerState::Stopped;
        metrics::set_scheduler_state(SchedulerState::Stopped);
        outcome
    }

    fn transition_to_running(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if *state != SchedulerState::Idle {
            return Err(SchedulerError::InvalidState { state: *state });
        }
        *state = SchedulerState::Running;
        metrics::set_scheduler_state(SchedulerState::Running);
        Ok(())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("settings", &self.shared.settings)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NoOpPublisher;
    use crate::application::services::{DispatcherSettings, SourceRegistry};
    use crate::infrastructure::storage::InMemoryObservationStore;

    fn scheduler(interval: Duration) -> Scheduler {
        let dispatcher = Arc::new(IngestionDispatcher::new(
            Arc::new(SourceRegistry::new()),
            Arc::new(InMemoryObservationStore::new()),
            Arc::new(NoOpPublisher),
            DispatcherSettings::default(),
        ));
        Scheduler::new(
            dispatcher,
            SchedulerSettings {
                symbols: vec![Symbol::new("BTCUSDT")],
                sources: vec!["binance".to_string()],
                interval,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_startup_cycle() {
        let scheduler = scheduler(Duration::from_secs(30));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start().await.unwrap();

        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(scheduler.stats().cycles_started, 1);
        assert_eq!(scheduler.dispatcher().cycles_run(), 1);

        assert_eq!(
            scheduler.stop(Duration::from_secs(1)).await,
            StopOutcome::Graceful
        );
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.cancellation_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected() {
        let scheduler = scheduler(Duration::from_secs(30));
        scheduler.start().await.unwrap();

        assert_eq!(
            scheduler.start().await,
            Err(SchedulerError::InvalidState {
                state: SchedulerState::Running
            })
        );

        scheduler.stop(Duration::from_secs(1)).await;
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::InvalidState {
                state: SchedulerState::Stopped
            })
        ));
    }

    #[tokio::test]
    async fn stop_on_idle_moves_to_stopped() {
        let scheduler = scheduler(Duration::from_secs(30));

        assert_eq!(
            scheduler.stop(Duration::from_secs(1)).await,
            StopOutcome::NotRunning
        );
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.stats(), SchedulerStats::default());
        assert_eq!(
            scheduler.stop(Duration::from_secs(1)).await,
            StopOutcome::NotRunning
        );
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let scheduler = scheduler(Duration::ZERO);
        assert_eq!(scheduler.start().await, Err(SchedulerError::ZeroInterval));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_interval() {
        let scheduler = scheduler(Duration::from_millis(100));
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;

        // Startup cycle plus ticks at 100, 200, 300 ms.
        assert_eq!(scheduler.stats().cycles_started, 4);
        assert_eq!(scheduler.stats().ticks_dropped, 0);
        scheduler.stop(Duration::from_secs(1)).await;
    }

    #[test]
    fn state_labels() {
        assert_eq!(SchedulerState::Draining.to_string(), "draining");
        assert_eq!(
            SchedulerError::InvalidState {
                state: SchedulerState::Stopped
            }
            .to_string(),
            "scheduler cannot start from state stopped"
        );
    }
}
