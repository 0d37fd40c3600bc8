//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataSource`: Upstream venue producing observations for a symbol
//! - `ObservationStore`: Durable, idempotent persistence of observations
//! - `ObservationPublisher`: Best-effort republishing onto the message bus

mod publisher_port;
mod source_port;
mod store_port;

#[cfg(test)]
pub use publisher_port::MockObservationPublisher;
pub use publisher_port::{BusError, NoOpPublisher, ObservationPublisher};
pub use source_port::{MarketDataSource, SharedSource, SourceError};
#[cfg(test)]
pub use store_port::MockObservationStore;
pub use store_port::{ObservationStore, StorageError};
