//! Source Registry
//!
//! Maps source names to pluggable [`MarketDataSource`] implementations.
//! The dispatcher resolves sources by name on every tick, so the map is
//! read far more often than written. Lookups take a shared read lock and
//! clone the `Arc` out; a registration that lands afterwards never affects
//! a source already handed to an in-flight dispatch.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{MarketDataSource, SharedSource};

/// Registry of named upstream sources.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, SharedSource>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `name`, replacing any previous binding.
    pub fn register(&self, name: impl Into<String>, source: Arc<dyn MarketDataSource>) {
        let name = name.into();
        let replaced = self.sources.write().insert(name.clone(), source).is_some();

        if replaced {
            tracing::info!(source = %name, "Replaced data source");
        } else {
            tracing::info!(source = %name, "Registered data source");
        }
    }

    /// Resolve a source by name.
    ///
    /// Unknown names resolve to `None`; callers treat that as skip-and-log.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<SharedSource> {
        self.sources.read().get(name).cloned()
    }

    /// Snapshot of the registered names.
    #[must_use]
    pub fn list_names(&self) -> BTreeSet<String> {
        self.sources.read().keys().cloned().collect()
    }

    /// Check whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sources.read().contains_key(name)
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Check if no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.list_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::SourceError;
    use crate::domain::observation::{Observation, Symbol};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct NamedSource(&'static str);

    #[async_trait]
    impl MarketDataSource for NamedSource {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch_current(&self, _symbol: &Symbol) -> Result<Vec<Observation>, SourceError> {
            Ok(vec![])
        }

        async fn fetch_range(
            &self,
            _symbol: &Symbol,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Observation>, SourceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn resolve_registered_and_unknown() {
        let registry = SourceRegistry::new();
        registry.register("binance", Arc::new(NamedSource("binance")));
        registry.register("okx", Arc::new(NamedSource("okx")));

        assert_eq!(registry.resolve("binance").unwrap().name(), "binance");
        assert_eq!(registry.resolve("okx").unwrap().name(), "okx");
        assert!(registry.resolve("nonexistent").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_replaces_binding() {
        let registry = SourceRegistry::new();
        registry.register("primary", Arc::new(NamedSource("first")));

        let in_flight = registry.resolve("primary").unwrap();
        registry.register("primary", Arc::new(NamedSource("second")));

        // Lookup already handed out keeps the old source.
        assert_eq!(in_flight.name(), "first");
        assert_eq!(registry.resolve("primary").unwrap().name(), "second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_names_is_a_snapshot() {
        let registry = SourceRegistry::new();
        assert!(registry.is_empty());

        registry.register("okx", Arc::new(NamedSource("okx")));
        registry.register("binance", Arc::new(NamedSource("binance")));
        let names = registry.list_names();

        registry.register("kraken", Arc::new(NamedSource("kraken")));

        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["binance".to_string(), "okx".to_string()]
        );
        assert!(registry.contains("kraken"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lookups_during_registration() {
        let registry = Arc::new(SourceRegistry::new());
        registry.register("binance", Arc::new(NamedSource("binance")));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for _ in 0..1_000 {
                    assert!(registry.resolve("binance").is_some());
                }
            }));
        }
        for i in 0..50 {
            registry.register(format!("venue-{i}"), Arc::new(NamedSource("late")));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), 51);
    }
}
