//! In-Process Message Bus
//!
//! Republishes observations on a tokio broadcast channel so any number of
//! downstream consumers can subscribe without the engine knowing them.
//!
//! Every observation travels as an [`ObservationEnvelope`]:
//! - `topic`: the configured bus topic
//! - `key`: the observation symbol, for per-symbol partitioning downstream
//! - `headers`: `source` and `timestamp` (RFC 3339)
//! - `payload`: the observation serialized as JSON
//!
//! Sending with no subscribers is not a failure; the envelope is simply
//! dropped. Slow subscribers lag and skip, they never block publishing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::SecondsFormat;
use tokio::sync::broadcast;

use crate::application::ports::{BusError, ObservationPublisher};
use crate::domain::observation::Observation;

// =============================================================================
// Envelope
// =============================================================================

/// One observation as carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationEnvelope {
    /// Bus topic.
    pub topic: String,
    /// Partition key (symbol).
    pub key: String,
    /// Message headers.
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded observation.
    pub payload: Vec<u8>,
}

impl ObservationEnvelope {
    /// Wrap an observation for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Serialization`] if the payload cannot be encoded.
    pub fn wrap(topic: &str, observation: &Observation) -> Result<Self, BusError> {
        let payload = serde_json::to_vec(observation).map_err(|e| BusError::Serialization {
            message: e.to_string(),
        })?;

        let headers = BTreeMap::from([
            ("source".to_string(), observation.source().to_string()),
            (
                "timestamp".to_string(),
                observation
                    .timestamp()
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ]);

        Ok(Self {
            topic: topic.to_string(),
            key: observation.symbol().as_str().to_string(),
            headers,
            payload,
        })
    }

    /// Decode the payload back into an observation.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Serialization`] if the payload is not a valid
    /// observation.
    pub fn decode(&self) -> Result<Observation, BusError> {
        serde_json::from_slice(&self.payload).map_err(|e| BusError::Serialization {
            message: e.to_string(),
        })
    }

    /// Look up a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

// =============================================================================
// Broadcast Bus
// =============================================================================

/// Broadcast bus publishing [`ObservationEnvelope`]s on one topic.
#[derive(Debug)]
pub struct BroadcastBus {
    topic: String,
    tx: broadcast::Sender<ObservationEnvelope>,
    closed: AtomicBool,
}

/// Shared handle to the bus.
pub type SharedBroadcastBus = Arc<BroadcastBus>;

impl BroadcastBus {
    /// Create a bus for `topic` with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        Self {
            topic: topic.into(),
            tx: broadcast::channel(capacity).0,
            closed: AtomicBool::new(false),
        }
    }

    /// Topic stamped on every envelope.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscribe to envelopes published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ObservationEnvelope> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Stop accepting publishes.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(topic = %self.topic, "Message bus closed");
        }
    }

    /// Check whether the bus has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ObservationPublisher for BroadcastBus {
    async fn publish_observations(&self, observations: &[Observation]) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let envelopes = observations
            .iter()
            .map(|o| ObservationEnvelope::wrap(&self.topic, o))
            .collect::<Result<Vec<_>, _>>()?;

        let mut delivered = 0;
        for envelope in envelopes {
            // Err only means there are no subscribers right now.
            if let Ok(receivers) = self.tx.send(envelope) {
                delivered = receivers;
            }
        }

        tracing::debug!(
            topic = %self.topic,
            count = observations.len(),
            receivers = delivered,
            "Published market data to bus"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
