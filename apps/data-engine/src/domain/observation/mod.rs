//! Market Data Observations
//!
//! An [`Observation`] is one price/volume data point for a symbol, produced by
//! a named upstream source at fetch time. Observations are immutable once
//! constructed: fields are private and only exposed through accessors.
//!
//! Construction never validates. Validity is a separate pure predicate (see
//! [`validate`]) so that malformed records coming from an upstream can be
//! represented, inspected and rejected.

mod validation;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use validation::{
    BatchValidationError, ObservationField, ValidationError, validate, validate_batch,
};

/// Seconds from the Unix epoch back to `0001-01-01T00:00:00Z`.
const CALENDAR_ZERO_SECS: i64 = -62_135_596_800;

// =============================================================================
// Symbol
// =============================================================================

/// A trading symbol (e.g. `BTCUSDT`).
///
/// The symbol is normalized to uppercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new symbol.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_uppercase())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the symbol is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// Observation
// =============================================================================

/// One market data point observed by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    id: String,
    symbol: Symbol,
    price: Decimal,
    volume: Decimal,
    timestamp: DateTime<Utc>,
    source: String,
}

impl Observation {
    /// Create an observation with a freshly generated identifier.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        price: Decimal,
        volume: Decimal,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            symbol,
            price,
            volume,
            timestamp,
            source,
        )
    }

    /// Create an observation with a caller-supplied identifier.
    ///
    /// Re-delivering an observation with the same identifier is how the
    /// store recognizes duplicates.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        symbol: impl Into<Symbol>,
        price: Decimal,
        volume: Decimal,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
            source: source.into(),
        }
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Instrument symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Observed price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Observed volume.
    #[must_use]
    pub const fn volume(&self) -> Decimal {
        self.volume
    }

    /// When the data point was observed.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Name of the source that produced the observation.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check whether the timestamp is a zero value.
    ///
    /// Both the calendar zero instant `0001-01-01T00:00:00Z` (what upstreams
    /// emit for an unset time) and the Unix epoch (an unset `DateTime<Utc>`)
    /// count as zero.
    #[must_use]
    pub fn has_zero_timestamp(&self) -> bool {
        if self.timestamp.timestamp_subsec_nanos() != 0 {
            return false;
        }
        matches!(self.timestamp.timestamp(), 0 | CALENDAR_ZERO_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn symbol_is_normalized() {
        assert_eq!(Symbol::new(" btcusdt ").as_str(), "BTCUSDT");
        assert_eq!(Symbol::from("ethusdt").to_string(), "ETHUSDT");
    }

    #[test]
    fn new_generates_unique_ids() {
        let now = Utc::now();
        let a = Observation::new("BTCUSDT", Decimal::ONE, Decimal::ZERO, now, "binance");
        let b = Observation::new("BTCUSDT", Decimal::ONE, Decimal::ZERO, now, "binance");
        assert!(!a.id().is_empty());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn zero_timestamp_detection() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let obs = Observation::with_id("id-1", "BTCUSDT", Decimal::ONE, Decimal::ONE, epoch, "okx");
        assert!(obs.has_zero_timestamp());

        let obs = Observation::with_id(
            "id-2",
            "BTCUSDT",
            Decimal::ONE,
            Decimal::ONE,
            Utc::now(),
            "okx",
        );
        assert!(!obs.has_zero_timestamp());
    }

    #[test]
    fn serializes_with_flat_fields() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 19, 12, 0, 0).unwrap();
        let obs = Observation::with_id(
            "obs-1",
            "BTCUSDT",
            Decimal::new(104_250, 1),
            Decimal::new(3, 0),
            ts,
            "binance",
        );

        let json: serde_json::Value = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["id"], "obs-1");
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["source"], "binance");
        assert_eq!(json["timestamp"], "2026-01-19T12:00:00Z");

        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }
}
