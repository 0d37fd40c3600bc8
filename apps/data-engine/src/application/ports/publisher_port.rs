//! Observation Publisher Port (Driven Port)
//!
//! Interface for republishing observations onto the message bus.

use async_trait::async_trait;

use crate::domain::observation::Observation;

/// Bus publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    /// Bus has been closed.
    #[error("Bus is closed")]
    Closed,

    /// Serialization error.
    #[error("Bus serialization error: {message}")]
    Serialization {
        /// Error details.
        message: String,
    },

    /// Publishing failed.
    #[error("Bus publish failed: {message}")]
    PublishFailed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing observations.
///
/// At-least-once delivery is acceptable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationPublisher: Send + Sync {
    /// Publish a batch of observations.
    async fn publish_observations(&self, observations: &[Observation]) -> Result<(), BusError>;

    /// Verify the bus is reachable.
    async fn health_check(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// No-op publisher for testing and dry runs.
#[derive(Debug, Clone, Default)]
pub struct NoOpPublisher;

#[async_trait]
impl ObservationPublisher for NoOpPublisher {
    async fn publish_observations(&self, _observations: &[Observation]) -> Result<(), BusError> {
        Ok(())
    }
}
