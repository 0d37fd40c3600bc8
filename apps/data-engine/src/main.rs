//! Data Engine Binary
//!
//! Starts the market data ingestion engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin data-engine
//! ```
//!
//! # Environment Variables
//!
//! - `INGEST_SYMBOLS`: Comma-separated symbols (default: BTCUSDT,ETHUSDT,BNBUSDT)
//! - `INGEST_SOURCES`: Comma-separated source names (default: binance,okx)
//! - `MAX_SYMBOLS`: Upper bound on configured symbols (default: 10)
//! - `PROCESSING_INTERVAL`: Seconds between ticks (default: 30)
//! - `INGEST_SHUTDOWN_GRACE_SECS`: Drain grace period (default: 5)
//! - `INGEST_MAX_CONCURRENT_PAIRS`: Dispatcher concurrency (default: 1)
//! - `DATA_SOURCE_TIMEOUT`: Per-fetch timeout in seconds (default: 10)
//! - `EXCHANGE_API_KEY` / `EXCHANGE_API_SECRET`: Venue credentials
//! - `DATABASE_PATH`: turso database file (default: market_data.db)
//! - `BUS_TOPIC`: Bus topic (default: quant_data)
//! - `BUS_CAPACITY`: Bus channel capacity (default: 10000)
//! - `API_PORT`: Health and metrics HTTP port (default: 8080)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter (default: data_engine=info)

use std::sync::Arc;

use anyhow::Context;
use data_engine::infrastructure::metrics;
use data_engine::infrastructure::telemetry;
use data_engine::{
    BroadcastBus, DispatcherSettings, HealthServer, HealthServerState, IngestConfig,
    IngestionDispatcher, ObservationPublisher, ObservationStore, Scheduler, SchedulerSettings,
    SimulatedExchangeSource, SourceRegistry, StopOutcome, TursoObservationStore, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting data engine");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    // Store and bus must be reachable before the first tick.
    let store = Arc::new(
        TursoObservationStore::open(&config.storage.database_path)
            .await
            .context("failed to open market data store")?,
    );
    store
        .health_check()
        .await
        .context("market data store health check failed")?;

    let bus = Arc::new(BroadcastBus::new(config.bus.topic.clone(), config.bus.capacity));
    bus.health_check()
        .await
        .context("message bus health check failed")?;

    let registry = Arc::new(SourceRegistry::new());
    for name in &config.ingest.sources {
        registry.register(
            name.clone(),
            Arc::new(SimulatedExchangeSource::new(
                name.clone(),
                config.source.credentials.clone(),
            )),
        );
    }
    metrics::set_registered_sources(registry.len());

    let dispatcher = Arc::new(IngestionDispatcher::new(
        Arc::clone(&registry),
        store,
        Arc::clone(&bus) as Arc<dyn ObservationPublisher>,
        DispatcherSettings {
            fetch_timeout: config.source.timeout,
            max_concurrent_pairs: config.ingest.max_concurrent_pairs,
            ..DispatcherSettings::default()
        },
    ));

    let scheduler = Arc::new(Scheduler::new(
        dispatcher,
        SchedulerSettings {
            symbols: config.ingest.symbols.clone(),
            sources: config.ingest.sources.clone(),
            interval: config.ingest.interval,
        },
    ));

    let shutdown_token = CancellationToken::new();

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&scheduler),
    ));
    let health_server = HealthServer::new(
        config.server.api_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    scheduler
        .start()
        .await
        .context("failed to start scheduler")?;

    tracing::info!("Data engine ready");

    await_shutdown().await;

    match scheduler.stop(config.ingest.shutdown_grace).await {
        StopOutcome::Graceful => tracing::info!("All in-flight work drained"),
        StopOutcome::Forced => tracing::warn!("Shutdown forced after grace period"),
        StopOutcome::NotRunning => tracing::debug!("Scheduler was not running"),
    }

    shutdown_token.cancel();
    if let Err(e) = health_task.await {
        tracing::warn!(error = %e, "Health server task ended abnormally");
    }
    bus.close();

    tracing::info!("Data engine stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    let symbols: Vec<&str> = config.ingest.symbols.iter().map(|s| s.as_str()).collect();
    tracing::info!(
        symbols = ?symbols,
        sources = ?config.ingest.sources,
        interval_secs = config.ingest.interval.as_secs(),
        max_concurrent_pairs = config.ingest.max_concurrent_pairs,
        database_path = %config.storage.database_path,
        bus_topic = %config.bus.topic,
        api_port = config.server.api_port,
        "Configuration loaded"
    );
    if !config.source.credentials.is_configured() {
        tracing::debug!("No exchange credentials configured");
    }
}

/// Load .env file from the current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
