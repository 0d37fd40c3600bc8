//! Market Data Source Port (Driven Port)
//!
//! Interface for upstream venues that produce observations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::observation::{Observation, Symbol};

/// Upstream fetch error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Upstream request failed (network, venue-side error).
    #[error("upstream {venue} failed: {message}")]
    Upstream {
        /// Source name.
        venue: String,
        /// Error details.
        message: String,
    },

    /// Upstream did not answer within the fetch timeout.
    #[error("upstream {venue} timed out after {timeout_ms}ms")]
    Timeout {
        /// Source name.
        venue: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Requested time range is empty or inverted.
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Range start.
        start: DateTime<Utc>,
        /// Range end.
        end: DateTime<Utc>,
    },

    /// Upstream response could not be mapped to observations.
    #[error("failed to parse upstream response: {message}")]
    Parse {
        /// Error details.
        message: String,
    },
}

/// Port for a named upstream data source.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Name the source is registered under.
    fn name(&self) -> &str;

    /// Fetch the current observations for a symbol.
    async fn fetch_current(&self, symbol: &Symbol) -> Result<Vec<Observation>, SourceError>;

    /// Fetch observations in `[start, end)`, ordered by timestamp ascending.
    async fn fetch_range(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, SourceError>;
}

/// A source shared between the registry and in-flight dispatches.
pub type SharedSource = Arc<dyn MarketDataSource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_venue() {
        let err = SourceError::Upstream {
            venue: "okx".to_string(),
            message: "503".to_string(),
        };
        assert_eq!(err.to_string(), "upstream okx failed: 503");

        let err = SourceError::Timeout {
            venue: "binance".to_string(),
            timeout_ms: 10_000,
        };
        assert_eq!(err.to_string(), "upstream binance timed out after 10000ms");
    }
}
