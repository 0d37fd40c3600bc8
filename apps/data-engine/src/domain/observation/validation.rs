//! Record Validation
//!
//! Pure well-formedness checks applied to every observation before it may
//! reach either sink. Rules are evaluated in a fixed order and the first
//! violated field is reported, so the same bad record always yields the
//! same error.

use std::fmt;

use rust_decimal::Decimal;

use super::Observation;

/// Observation field named by a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationField {
    /// Observation identifier.
    Id,
    /// Instrument symbol.
    Symbol,
    /// Observed price.
    Price,
    /// Observed volume.
    Volume,
    /// Observation timestamp.
    Timestamp,
    /// Source name.
    Source,
}

impl ObservationField {
    /// Get the field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Symbol => "symbol",
            Self::Price => "price",
            Self::Volume => "volume",
            Self::Timestamp => "timestamp",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for ObservationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed observation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid observation: {field} {reason}")]
pub struct ValidationError {
    field: ObservationField,
    reason: &'static str,
}

impl ValidationError {
    const fn new(field: ObservationField, reason: &'static str) -> Self {
        Self { field, reason }
    }

    /// The first field that violated a rule.
    #[must_use]
    pub const fn field(&self) -> ObservationField {
        self.field
    }

    /// Human readable description of the violated rule.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        self.reason
    }
}

/// A batch containing at least one malformed observation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("observation at index {index} rejected: {error}")]
pub struct BatchValidationError {
    /// Position of the first invalid observation in the batch.
    pub index: usize,
    /// The validation failure for that observation.
    #[source]
    pub error: ValidationError,
}

/// Validate a single observation.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the first violated field, checked in
/// the order id, symbol, price, volume, timestamp, source.
pub fn validate(observation: &Observation) -> Result<(), ValidationError> {
    if observation.id().is_empty() {
        return Err(ValidationError::new(ObservationField::Id, "is required"));
    }
    if observation.symbol().is_empty() {
        return Err(ValidationError::new(ObservationField::Symbol, "is required"));
    }
    if observation.price() <= Decimal::ZERO {
        return Err(ValidationError::new(
            ObservationField::Price,
            "must be greater than 0",
        ));
    }
    if observation.volume() < Decimal::ZERO {
        return Err(ValidationError::new(
            ObservationField::Volume,
            "cannot be negative",
        ));
    }
    if observation.has_zero_timestamp() {
        return Err(ValidationError::new(
            ObservationField::Timestamp,
            "is required",
        ));
    }
    if observation.source().is_empty() {
        return Err(ValidationError::new(ObservationField::Source, "is required"));
    }
    Ok(())
}

/// Validate every observation in a batch.
///
/// # Errors
///
/// Returns the index and error of the first invalid observation.
pub fn validate_batch(observations: &[Observation]) -> Result<(), BatchValidationError> {
    observations
        .iter()
        .enumerate()
        .try_for_each(|(index, observation)| {
            validate(observation).map_err(|error| BatchValidationError { index, error })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use test_case::test_case;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    fn valid() -> Observation {
        Observation::with_id(
            "obs-1",
            "BTCUSDT",
            Decimal::new(1050, 0),
            Decimal::new(10_500, 0),
            ts(),
            "binance",
        )
    }

    #[test]
    fn accepts_well_formed_observation() {
        assert_eq!(validate(&valid()), Ok(()));
    }

    #[test]
    fn accepts_zero_volume() {
        let obs = Observation::with_id("a", "BTCUSDT", Decimal::ONE, Decimal::ZERO, ts(), "okx");
        assert!(validate(&obs).is_ok());
    }

    #[test_case("", "BTCUSDT", 1, 1, true, "binance", ObservationField::Id ; "empty id")]
    #[test_case("a", "", 1, 1, true, "binance", ObservationField::Symbol ; "empty symbol")]
    #[test_case("a", "BTCUSDT", 0, 1, true, "binance", ObservationField::Price ; "zero price")]
    #[test_case("a", "BTCUSDT", -5, 1, true, "binance", ObservationField::Price ; "negative price")]
    #[test_case("a", "BTCUSDT", 1, -1, true, "binance", ObservationField::Volume ; "negative volume")]
    #[test_case("a", "BTCUSDT", 1, 1, false, "binance", ObservationField::Timestamp ; "zero timestamp")]
    #[test_case("a", "BTCUSDT", 1, 1, true, "", ObservationField::Source ; "empty source")]
    fn rejects_violated_rule(
        id: &str,
        symbol: &str,
        price: i64,
        volume: i64,
        has_timestamp: bool,
        source: &str,
        expected: ObservationField,
    ) {
        let timestamp = if has_timestamp {
            ts()
        } else {
            DateTime::<Utc>::default()
        };
        let obs = Observation::with_id(
            id,
            symbol,
            Decimal::from(price),
            Decimal::from(volume),
            timestamp,
            source,
        );

        let err = validate(&obs).unwrap_err();
        assert_eq!(err.field(), expected);
        assert!(err.to_string().contains(expected.as_str()));
    }

    #[test_case(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap() ; "calendar zero instant")]
    #[test_case(DateTime::<Utc>::default() ; "unix epoch")]
    fn rejects_unset_timestamp(timestamp: DateTime<Utc>) {
        let obs = Observation::with_id("a", "BTCUSDT", Decimal::ONE, Decimal::ONE, timestamp, "okx");
        assert_eq!(validate(&obs).unwrap_err().field(), ObservationField::Timestamp);
    }

    #[test_case(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 1).unwrap() ; "second after calendar zero")]
    #[test_case(Utc.timestamp_opt(1, 0).unwrap() ; "second after epoch")]
    #[test_case(Utc.timestamp_opt(0, 1_000).unwrap() ; "microsecond after epoch")]
    fn accepts_timestamp_next_to_zero(timestamp: DateTime<Utc>) {
        let obs = Observation::with_id("a", "BTCUSDT", Decimal::ONE, Decimal::ONE, timestamp, "okx");
        assert!(validate(&obs).is_ok());
    }

    #[test]
    fn reports_first_violated_field_in_stable_order() {
        // Every rule is broken; id comes first.
        let obs = Observation::with_id(
            "",
            "",
            Decimal::ZERO,
            Decimal::NEGATIVE_ONE,
            DateTime::<Utc>::default(),
            "",
        );
        assert_eq!(validate(&obs).unwrap_err().field(), ObservationField::Id);

        // Price and source broken; price comes first.
        let obs = Observation::with_id("x", "ETHUSDT", Decimal::ZERO, Decimal::ONE, ts(), "");
        assert_eq!(validate(&obs).unwrap_err().field(), ObservationField::Price);
    }

    #[test]
    fn batch_reports_index_of_first_invalid() {
        let bad = Observation::with_id("b", "BTCUSDT", Decimal::ZERO, Decimal::ONE, ts(), "okx");
        let batch = vec![valid(), valid(), bad, valid()];

        let err = validate_batch(&batch).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.error.field(), ObservationField::Price);
    }

    #[test]
    fn empty_batch_is_valid() {
        assert!(validate_batch(&[]).is_ok());
    }

    proptest! {
        #[test]
        fn valid_iff_all_rules_hold(
            id in "[a-z0-9]{0,4}",
            symbol in "[A-Z]{0,4}",
            price in -1_000i64..1_000,
            volume in -1_000i64..1_000,
            secs in 0i64..2_000_000_000,
            source in "[a-z]{0,4}",
        ) {
            let timestamp = Utc.timestamp_opt(secs, 0).unwrap();
            let obs = Observation::with_id(
                id.clone(),
                symbol.clone(),
                Decimal::from(price),
                Decimal::from(volume),
                timestamp,
                source.clone(),
            );

            let expected = !id.is_empty()
                && !symbol.is_empty()
                && price > 0
                && volume >= 0
                && secs != 0
                && !source.is_empty();

            prop_assert_eq!(validate(&obs).is_ok(), expected);
        }
    }
}
