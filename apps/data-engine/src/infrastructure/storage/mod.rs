//! Observation Store Adapters
//!
//! - [`TursoObservationStore`]: durable store on an embedded turso database
//! - [`InMemoryObservationStore`]: process-local map for tests and dry runs

mod in_memory;
mod turso_store;

pub use in_memory::InMemoryObservationStore;
pub use turso_store::TursoObservationStore;
