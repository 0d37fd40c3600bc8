//! In-memory observation store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{ObservationStore, StorageError};
use crate::domain::observation::{Observation, Symbol};

/// Observation store backed by a map keyed by observation id.
///
/// Saving an id that is already present keeps the first copy.
#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    observations: RwLock<HashMap<String, Observation>>,
}

impl InMemoryObservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.read().is_empty()
    }

    /// Look up one observation by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Observation> {
        self.observations.read().get(id).cloned()
    }

    /// All stored observations for a symbol, oldest first.
    #[must_use]
    pub fn by_symbol(&self, symbol: &Symbol) -> Vec<Observation> {
        let mut matching: Vec<Observation> = self
            .observations
            .read()
            .values()
            .filter(|o| o.symbol() == symbol)
            .cloned()
            .collect();
        matching.sort_by_key(Observation::timestamp);
        matching
    }
}

#[async_trait]
impl ObservationStore for InMemoryObservationStore {
    async fn save_observations(&self, observations: &[Observation]) -> Result<(), StorageError> {
        let mut map = self.observations.write();
        for observation in observations {
            map.entry(observation.id().to_string())
                .or_insert_with(|| observation.clone());
        }
        Ok(())
    }

    async fn latest(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> Result<Vec<Observation>, StorageError> {
        let mut matching = self.by_symbol(symbol);
        matching.reverse();
        matching.truncate(limit);
        Ok(matching)
    }

    async fn range(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StorageError> {
        Ok(self
            .by_symbol(symbol)
            .into_iter()
            .filter(|o| o.timestamp() >= start && o.timestamp() <= end)
            .collect())
    }
}
