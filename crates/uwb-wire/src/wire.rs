//! Raw CUWB wire records.
//!
//! One JSON object per line:
//! ```text
//! {"type":"position","serial_number":"S1","timestamp":"2024-01-01T00:00:00Z","x":1000,"y":2000,"z":0,"quality":80,"anchor_count":4}
//! {"type":"accelerometer","serial_number":"S1","timestamp":"2024-01-01T00:00:00Z","x":12,"y":-3,"z":1024,"scale":2}
//! ```
//! Records whose `type` is not one of the four supported data types are
//! counted and ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use uwb_common::{DataType, SerialNumber};

use crate::error::WireError;

/// Position payload in integer millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosition {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub quality: i64,
    pub anchor_count: i64,
}

/// Motion payload: raw fixed-point axes plus the sensor full-scale value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMotion {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub scale: i64,
}

/// Type-specific payload of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPayload {
    Position(RawPosition),
    Accelerometer(RawMotion),
    Gyroscope(RawMotion),
    Magnetometer(RawMotion),
}

impl RawPayload {
    pub fn data_type(&self) -> DataType {
        match self {
            RawPayload::Position(_) => DataType::Position,
            RawPayload::Accelerometer(_) => DataType::Accelerometer,
            RawPayload::Gyroscope(_) => DataType::Gyroscope,
            RawPayload::Magnetometer(_) => DataType::Magnetometer,
        }
    }
}

/// A single parsed wire record. Never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub serial_number: SerialNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: RawPayload,
}

impl RawObservation {
    pub fn data_type(&self) -> DataType {
        self.payload.data_type()
    }
}

#[derive(Deserialize)]
struct Envelope {
    serial_number: String,
    #[serde(deserialize_with = "wire_timestamp")]
    timestamp: DateTime<Utc>,
}

/// RFC 3339 timestamps keep their offset; ISO-8601 without one is UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn wire_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

fn invalid(record_type: &str, err: serde_json::Error) -> WireError {
    WireError::InvalidRecord {
        record_type: record_type.to_string(),
        message: err.to_string(),
    }
}

/// Parse one already-decoded JSON object.
///
/// Returns `Ok(None)` for well-formed records of an unsupported type.
pub fn parse_value(value: &Value) -> Result<Option<RawObservation>, WireError> {
    let record_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string();
    let Some(data_type) = DataType::from_wire(&record_type) else {
        return Ok(None);
    };

    let envelope = Envelope::deserialize(value).map_err(|e| invalid(&record_type, e))?;

    let payload = match data_type {
        DataType::Position => RawPayload::Position(
            RawPosition::deserialize(value).map_err(|e| invalid(&record_type, e))?,
        ),
        DataType::Accelerometer => RawPayload::Accelerometer(
            RawMotion::deserialize(value).map_err(|e| invalid(&record_type, e))?,
        ),
        DataType::Gyroscope => RawPayload::Gyroscope(
            RawMotion::deserialize(value).map_err(|e| invalid(&record_type, e))?,
        ),
        DataType::Magnetometer => RawPayload::Magnetometer(
            RawMotion::deserialize(value).map_err(|e| invalid(&record_type, e))?,
        ),
    };

    Ok(Some(RawObservation {
        serial_number: SerialNumber::new(envelope.serial_number),
        timestamp: envelope.timestamp,
        payload,
    }))
}

/// Parse one line of the JSONL stream.
pub fn parse_line(line: &str) -> Result<Option<RawObservation>, WireError> {
    let value: Value = serde_json::from_str(line)?;
    parse_value(&value)
}

/// Outcome of parsing a whole JSONL blob.
#[derive(Debug, Default)]
pub struct ParseReport {
    /// Successfully parsed records, in input order.
    pub observations: Vec<RawObservation>,
    /// Well-formed records of unsupported types.
    pub unsupported: usize,
    /// Malformed lines as `(1-based line number, error)`.
    pub malformed: Vec<(usize, WireError)>,
}

impl ParseReport {
    /// Group the parsed records by data type.
    pub fn into_batches(self) -> RawBatches {
        RawBatches::from_observations(self.observations)
    }
}

/// Parse a newline-delimited JSON blob, skipping blank lines.
///
/// Malformed lines are recorded, never fatal.
pub fn parse_jsonl(blob: &str) -> ParseReport {
    let mut report = ParseReport::default();
    for (idx, line) in blob.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(Some(obs)) => report.observations.push(obs),
            Ok(None) => report.unsupported += 1,
            Err(e) => {
                debug!(line = idx + 1, error = %e, "Skipping malformed wire record");
                report.malformed.push((idx + 1, e));
            }
        }
    }
    report
}

/// Raw records grouped by data type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatches {
    batches: BTreeMap<DataType, Vec<RawObservation>>,
}

impl RawBatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = RawObservation>,
    {
        let mut batches = RawBatches::new();
        for obs in observations {
            batches.push(obs);
        }
        batches
    }

    pub fn push(&mut self, observation: RawObservation) {
        self.batches
            .entry(observation.data_type())
            .or_default()
            .push(observation);
    }

    /// Records of one type; empty slice when none were supplied.
    pub fn get(&self, data_type: DataType) -> &[RawObservation] {
        self.batches
            .get(&data_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total records across all types.
    pub fn len(&self) -> usize {
        self.batches.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
