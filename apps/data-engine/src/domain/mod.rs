//! Domain Layer - Core market data types and business rules.
//!
//! This layer contains the observation model and its validation rules
//! with no I/O. All types here are pure Rust with serialization support.

/// Market data observations and record validation.
pub mod observation;
