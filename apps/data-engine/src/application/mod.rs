//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (sources, store, bus).
pub mod ports;

/// Application services: source registry, dispatcher and scheduler.
pub mod services;
