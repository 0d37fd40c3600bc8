//! Observation Store Port (Driven Port)
//!
//! Interface for durable persistence of validated observations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::observation::{Observation, Symbol};

/// Storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Store could not be reached.
    #[error("Store connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Statement execution failed.
    #[error("Store query error: {message}")]
    Query {
        /// Error details.
        message: String,
    },

    /// Stored data could not be mapped back to an observation.
    #[error("Store integrity error: {message}")]
    Integrity {
        /// Error details.
        message: String,
    },
}

/// Port for the durable observation store.
///
/// Implementations must be idempotent: saving an observation whose
/// identifier is already stored is a no-op, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Persist a batch of observations.
    async fn save_observations(&self, observations: &[Observation]) -> Result<(), StorageError>;

    /// Most recent observations for a symbol, newest first.
    async fn latest(&self, symbol: &Symbol, limit: usize)
    -> Result<Vec<Observation>, StorageError>;

    /// Observations for a symbol in `[start, end]`, oldest first.
    async fn range(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
