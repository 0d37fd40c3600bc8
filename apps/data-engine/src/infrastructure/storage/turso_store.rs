//! Durable observation store on an embedded turso database.
//!
//! Prices and volumes are stored as decimal text so no precision is lost.
//! Timestamps are stored as UTC microseconds since the Unix epoch.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use turso::{Builder, Connection, Value};

use crate::application::ports::{ObservationStore, StorageError};
use crate::domain::observation::{Observation, Symbol};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS market_data (
        id TEXT PRIMARY KEY,
        symbol TEXT NOT NULL,
        price TEXT NOT NULL,
        volume TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        source TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_market_data_symbol ON market_data(symbol)",
    "CREATE INDEX IF NOT EXISTS idx_market_data_timestamp ON market_data(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_market_data_source ON market_data(source)",
];

const INSERT: &str = "INSERT OR IGNORE INTO market_data
    (id, symbol, price, volume, timestamp, source, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const SELECT_LATEST: &str = "SELECT id, symbol, price, volume, timestamp, source
    FROM market_data
    WHERE symbol = ?1
    ORDER BY timestamp DESC
    LIMIT ?2";

const SELECT_RANGE: &str = "SELECT id, symbol, price, volume, timestamp, source
    FROM market_data
    WHERE symbol = ?1 AND timestamp BETWEEN ?2 AND ?3
    ORDER BY timestamp ASC";

/// Observation store on turso.
///
/// A single connection is shared behind an async mutex; every batch is
/// written in its own transaction.
pub struct TursoObservationStore {
    conn: Mutex<Connection>,
    path: String,
}

impl TursoObservationStore {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// `:memory:` opens an ephemeral database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the database cannot be opened
    /// and [`StorageError::Query`] if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("failed to open {path}: {e}"),
            })?;
        let conn = db.connect().map_err(|e| StorageError::Connection {
            message: format!("failed to connect to {path}: {e}"),
        })?;

        for statement in SCHEMA {
            conn.execute(statement, ()).await.map_err(query_error)?;
        }

        tracing::info!(path, "Connected to market data store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_string(),
        })
    }

    async fn write_batch(conn: &Connection, observations: &[Observation]) -> Result<(), StorageError> {
        let created_at = Utc::now().timestamp_micros();
        for o in observations {
            conn.execute(
                INSERT,
                (
                    o.id().to_string(),
                    o.symbol().as_str().to_string(),
                    o.price().to_string(),
                    o.volume().to_string(),
                    o.timestamp().timestamp_micros(),
                    o.source().to_string(),
                    created_at,
                ),
            )
            .await
            .map_err(query_error)?;
        }
        Ok(())
    }

    /// Open the batch transaction.
    ///
    /// A save dropped mid-batch leaves its transaction open on the shared
    /// connection; that transaction is rolled back and a fresh one started.
    async fn begin(conn: &Connection) -> Result<(), StorageError> {
        if conn.execute("BEGIN", ()).await.is_ok() {
            return Ok(());
        }
        tracing::warn!("Rolling back transaction left open by an interrupted batch");
        conn.execute("ROLLBACK", ()).await.map_err(query_error)?;
        conn.execute("BEGIN", ()).await.map_err(query_error)?;
        Ok(())
    }

    async fn collect(
        conn: &Connection,
        sql: &str,
        params: impl turso::params::IntoParams,
    ) -> Result<Vec<Observation>, StorageError> {
        let mut rows = conn.query(sql, params).await.map_err(query_error)?;
        let mut observations = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_error)? {
            let mut values = Vec::with_capacity(6);
            for idx in 0..6 {
                values.push(row.get_value(idx).map_err(query_error)?);
            }
            observations.push(observation_from_values(values)?);
        }
        Ok(observations)
    }
}

#[async_trait]
impl ObservationStore for TursoObservationStore {
    async fn save_observations(&self, observations: &[Observation]) -> Result<(), StorageError> {
        if observations.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        Self::begin(&conn).await?;

        let written = match Self::write_batch(&conn, observations).await {
            Ok(()) => conn.execute("COMMIT", ()).await.map(drop).map_err(query_error),
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                tracing::error!(error = %rollback, "Failed to roll back market data batch");
            }
            return Err(e);
        }

        tracing::debug!(count = observations.len(), "Saved market data batch");
        Ok(())
    }

    async fn latest(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> Result<Vec<Observation>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn.lock().await;
        Self::collect(&conn, SELECT_LATEST, (symbol.as_str().to_string(), limit)).await
    }

    async fn range(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError> {
        let conn = self.conn.lock().await;
        Self::collect(
            &conn,
            SELECT_RANGE,
            (
                symbol.as_str().to_string(),
                start.timestamp_micros(),
                end.timestamp_micros(),
            ),
        )
        .await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        let mut rows = conn.query("SELECT 1", ()).await.map_err(|e| StorageError::Connection {
            message: e.to_string(),
        })?;
        rows.next().await.map_err(|e| StorageError::Connection {
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for TursoObservationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TursoObservationStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn query_error(e: turso::Error) -> StorageError {
    StorageError::Query {
        message: e.to_string(),
    }
}

fn integrity(message: impl Into<String>) -> StorageError {
    StorageError::Integrity {
        message: message.into(),
    }
}

fn text(value: Value, column: &str) -> Result<String, StorageError> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(integrity(format!("column {column}: expected text, got {other:?}"))),
    }
}

fn decimal(value: Value, column: &str) -> Result<Decimal, StorageError> {
    let raw = text(value, column)?;
    Decimal::from_str(&raw).map_err(|e| integrity(format!("column {column}: {e}")))
}

fn timestamp(value: Value) -> Result<DateTime<Utc>, StorageError> {
    match value {
        Value::Integer(micros) => DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| integrity(format!("timestamp {micros} out of range"))),
        other => Err(integrity(format!(
            "column timestamp: expected integer, got {other:?}"
        ))),
    }
}

fn observation_from_values(values: Vec<Value>) -> Result<Observation, StorageError> {
    let [id, symbol, price, volume, ts, source]: [Value; 6] = values
        .try_into()
        .map_err(|_| integrity("expected six columns"))?;

    Ok(Observation::with_id(
        text(id, "id")?,
        text(symbol, "symbol")?,
        decimal(price, "price")?,
        decimal(volume, "volume")?,
        timestamp(ts)?,
        text(source, "source")?,
    ))
}
