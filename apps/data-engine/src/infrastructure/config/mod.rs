//! Configuration Module
//!
//! Configuration loading for the ingestion engine.

mod settings;

pub use settings::{
    BusSettings, ConfigError, Credentials, IngestConfig, IngestSettings, ServerSettings,
    SourceSettings, StorageSettings,
};
