//! Wire types for the monitoring service and decoding into typed readings.
//!
//! The service answers with a JSON array of
//! `{datetime, expected: {energy, irradiation}, observed: {energy, irradiation}}`.
//! Every element is decoded on its own so one bad entry never poisons the batch.

use chrono::{DateTime, DurationRound, NaiveDateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::str::FromStr;

// `%#z` takes `+02:00`, `+0200` and `+02`.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Exclusive bound of the `NUMERIC(15, 10)` measurement columns.
const STORED_MAGNITUDE_LIMIT: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub energy: Decimal,
    pub irradiation: Decimal,
}

/// One hourly reading with a timestamp already normalized to a whole UTC hour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub datetime: DateTime<Utc>,
    pub expected: Metrics,
    pub observed: Metrics,
}

/// A reading that could not be decoded and was dropped from the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reading #{index} is malformed: {reason}")]
pub struct MalformedReading {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawReading {
    datetime: String,
    expected: RawMetrics,
    observed: RawMetrics,
}

#[derive(Debug, Deserialize)]
struct RawMetrics {
    energy: Number,
    irradiation: Number,
}

impl RawMetrics {
    fn to_metrics(&self, field: &str) -> Result<Metrics, String> {
        Ok(Metrics {
            energy: storable(&self.energy, field, "energy")?,
            irradiation: storable(&self.irradiation, field, "irradiation")?,
        })
    }
}

fn storable(number: &Number, field: &str, metric: &str) -> Result<Decimal, String> {
    let value = decimal_from_number(number)
        .ok_or_else(|| format!("{field}.{metric}: {number} is not representable as a decimal"))?;
    if value.abs() >= Decimal::from(STORED_MAGNITUDE_LIMIT) {
        return Err(format!(
            "{field}.{metric}: {number} is out of range (magnitude must stay below {STORED_MAGNITUDE_LIMIT})"
        ));
    }
    Ok(value)
}

/// Decode the response array, splitting good readings from malformed ones.
pub fn decode_readings(items: Vec<Value>) -> (Vec<Reading>, Vec<MalformedReading>) {
    let mut readings = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        match decode_reading(item) {
            Ok(reading) => readings.push(reading),
            Err(reason) => skipped.push(MalformedReading { index, reason }),
        }
    }

    (readings, skipped)
}

fn decode_reading(item: Value) -> Result<Reading, String> {
    let raw: RawReading = serde_path_to_error::deserialize(item).map_err(|e| {
        let path = e.path().to_string();
        format!("{}: {}", path, e.into_inner())
    })?;

    let datetime =
        parse_timestamp(&raw.datetime).ok_or_else(|| format!("datetime: unparseable timestamp {:?}", raw.datetime))?;

    Ok(Reading {
        datetime,
        expected: raw.expected.to_metrics("expected")?,
        observed: raw.observed.to_metrics("observed")?,
    })
}

/// Parse an ISO-8601 timestamp into a UTC instant truncated to the hour.
///
/// Offsets are converted to UTC; naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .ok()
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
        })
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })?;
    parsed.duration_trunc(TimeDelta::hours(1)).ok()
}

/// Convert a JSON number into a decimal using its textual form, so that the
/// fractional digits the service sent are kept as-is.
pub fn decimal_from_number(number: &Number) -> Option<Decimal> {
    if let Some(v) = number.as_i64() {
        return Some(Decimal::from(v));
    }
    if let Some(v) = number.as_u64() {
        return Some(Decimal::from(v));
    }
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .map(|d| d.normalize())
}
