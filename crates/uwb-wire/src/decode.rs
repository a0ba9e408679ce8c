//! Fixed-point decoding of raw wire records into physical units.
//!
//! - Position: millimeters to meters (`raw / 1000`); quality and anchor
//!   count pass through.
//! - Motion: `raw * scale / MAX_INT[byte_width]` per axis.
//!
//! A record that fails to decode yields a [`DecodeError`] carrying the
//! record; batch decoding keeps going and reports the skip count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uwb_common::config::MotionByteWidths;
use uwb_common::{DataType, SerialNumber};

use crate::error::{DecodeError, DecodeFailure};
use crate::scale::ScaleTable;
use crate::wire::{RawMotion, RawObservation, RawPayload, RawPosition};
use crate::MILLIMETERS_PER_METER;

/// Decoded position in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReading {
    pub timestamp: DateTime<Utc>,
    pub serial_number: SerialNumber,
    pub coordinates: [f64; 3],
    pub quality: u32,
    pub anchor_count: u32,
}

/// Decoded three-axis motion sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionReading {
    #[serde(skip_serializing)]
    pub data_type: DataType,
    pub timestamp: DateTime<Utc>,
    pub serial_number: SerialNumber,
    #[serde(rename = "data")]
    pub axis: [f64; 3],
}

/// A decoded reading, not yet attached to a device identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Position(PositionReading),
    Motion(MotionReading),
}

impl Reading {
    pub fn data_type(&self) -> DataType {
        match self {
            Reading::Position(_) => DataType::Position,
            Reading::Motion(m) => m.data_type,
        }
    }

    pub fn serial_number(&self) -> &SerialNumber {
        match self {
            Reading::Position(p) => &p.serial_number,
            Reading::Motion(m) => &m.serial_number,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Reading::Position(p) => p.timestamp,
            Reading::Motion(m) => m.timestamp,
        }
    }
}

fn to_u32(field: &'static str, value: i64) -> Result<u32, DecodeFailure> {
    u32::try_from(value).map_err(|_| DecodeFailure::FieldOutOfRange { field, value })
}

/// Convert a raw position payload: `(meters, quality, anchor_count)`.
pub fn decode_position(raw: &RawPosition) -> Result<([f64; 3], u32, u32), DecodeFailure> {
    let coordinates = [
        raw.x as f64 / MILLIMETERS_PER_METER,
        raw.y as f64 / MILLIMETERS_PER_METER,
        raw.z as f64 / MILLIMETERS_PER_METER,
    ];
    let quality = to_u32("quality", raw.quality)?;
    let anchor_count = to_u32("anchor_count", raw.anchor_count)?;
    Ok((coordinates, quality, anchor_count))
}

/// Convert a raw motion payload for fields of `byte_width` bytes.
///
/// Each axis must be representable in the signed width, `[-(max + 1), max]`.
/// The divisor is always `max`, so the most negative value decodes slightly
/// past `-scale`.
pub fn decode_motion(
    raw: &RawMotion,
    byte_width: u8,
    scales: &ScaleTable,
) -> Result<[f64; 3], DecodeFailure> {
    let max = scales
        .max_int(byte_width)
        .ok_or(DecodeFailure::UnknownByteWidth(byte_width))?;

    let mut axis = [0.0; 3];
    for (slot, (name, value)) in axis
        .iter_mut()
        .zip([('x', raw.x), ('y', raw.y), ('z', raw.z)])
    {
        if value < -max - 1 || value > max {
            return Err(DecodeFailure::AxisOutOfRange {
                axis: name,
                value,
                max,
                byte_width,
            });
        }
        *slot = value as f64 * raw.scale as f64 / max as f64;
    }
    Ok(axis)
}

/// Result of decoding a batch: readings plus the records that were skipped.
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub readings: Vec<Reading>,
    pub errors: Vec<DecodeError>,
}

impl DecodeReport {
    /// Number of records skipped because they failed to decode.
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }
}

/// Stateless decoder bound to a scale table and motion byte widths.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    scales: &'a ScaleTable,
    widths: MotionByteWidths,
}

impl<'a> Decoder<'a> {
    pub fn new(scales: &'a ScaleTable, widths: MotionByteWidths) -> Self {
        Decoder { scales, widths }
    }

    /// Decode one record.
    pub fn decode(&self, record: &RawObservation) -> Result<Reading, DecodeError> {
        let fail = |failure| DecodeError::new(record, failure);
        match &record.payload {
            RawPayload::Position(raw) => {
                let (coordinates, quality, anchor_count) = decode_position(raw).map_err(fail)?;
                Ok(Reading::Position(PositionReading {
                    timestamp: record.timestamp,
                    serial_number: record.serial_number.clone(),
                    coordinates,
                    quality,
                    anchor_count,
                }))
            }
            RawPayload::Accelerometer(raw)
            | RawPayload::Gyroscope(raw)
            | RawPayload::Magnetometer(raw) => {
                let data_type = record.data_type();
                let width = self
                    .widths
                    .for_type(data_type)
                    .ok_or_else(|| fail(DecodeFailure::UnknownByteWidth(0)))?;
                let axis = decode_motion(raw, width, self.scales).map_err(fail)?;
                Ok(Reading::Motion(MotionReading {
                    data_type,
                    timestamp: record.timestamp,
                    serial_number: record.serial_number.clone(),
                    axis,
                }))
            }
        }
    }

    /// Decode every record; failures are collected, never fatal.
    pub fn decode_batch(&self, records: &[RawObservation]) -> DecodeReport {
        let mut report = DecodeReport::default();
        for record in records {
            match self.decode(record) {
                Ok(reading) => report.readings.push(reading),
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable record");
                    report.errors.push(e);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn position(x: i64, y: i64, z: i64) -> RawObservation {
        RawObservation {
            serial_number: "S1".into(),
            timestamp: ts(),
            payload: RawPayload::Position(RawPosition {
                x,
                y,
                z,
                quality: 80,
                anchor_count: 4,
            }),
        }
    }

    fn gyro(x: i64, scale: i64) -> RawObservation {
        RawObservation {
            serial_number: "S2".into(),
            timestamp: ts(),
            payload: RawPayload::Gyroscope(RawMotion { x, y: 0, z: -x, scale }),
        }
    }

    #[test]
    fn test_position_mm_to_m() {
        let (coords, quality, anchors) = decode_position(&RawPosition {
            x: 1000,
            y: -2500,
            z: 0,
            quality: 80,
            anchor_count: 4,
        })
        .unwrap();
        assert_eq!(coords, [1.0, -2.5, 0.0]);
        assert_eq!(quality, 80);
        assert_eq!(anchors, 4);
    }

    #[test]
    fn test_negative_quality_rejected() {
        let err = decode_position(&RawPosition {
            x: 0,
            y: 0,
            z: 0,
            quality: -1,
            anchor_count: 4,
        })
        .unwrap_err();
        assert_eq!(
            err,
            DecodeFailure::FieldOutOfRange {
                field: "quality",
                value: -1
            }
        );
    }

    #[test]
    fn test_motion_full_scale() {
        let table = ScaleTable::standard();
        let raw = RawMotion {
            x: i32::MAX as i64,
            y: -(i32::MAX as i64),
            z: 0,
            scale: 16,
        };
        assert_eq!(decode_motion(&raw, 4, &table).unwrap(), [16.0, -16.0, 0.0]);
    }

    #[test]
    fn test_motion_two_byte_width() {
        let table = ScaleTable::standard();
        let raw = RawMotion {
            x: 32767,
            y: 0,
            z: -32767,
            scale: 2000,
        };
        assert_eq!(decode_motion(&raw, 2, &table).unwrap(), [2000.0, 0.0, -2000.0]);
    }

    #[test]
    fn test_motion_out_of_range_axis() {
        let table = ScaleTable::standard();
        let raw = RawMotion {
            x: 0,
            y: 128,
            z: 0,
            scale: 2,
        };
        let err = decode_motion(&raw, 1, &table).unwrap_err();
        assert!(matches!(err, DecodeFailure::AxisOutOfRange { axis: 'y', .. }));
    }

    #[test]
    fn test_motion_accepts_most_negative_value() {
        let table = ScaleTable::standard();
        let raw = RawMotion {
            x: -128,
            y: i16::MIN as i64,
            z: 0,
            scale: 127,
        };
        // i16::MIN does not fit in one byte
        assert!(decode_motion(&raw, 1, &table).is_err());

        let raw = RawMotion {
            x: -128,
            y: 0,
            z: 0,
            scale: 127,
        };
        assert_eq!(decode_motion(&raw, 1, &table).unwrap(), [-128.0, 0.0, 0.0]);

        let raw = RawMotion {
            x: 0,
            y: i16::MIN as i64,
            z: 0,
            scale: 32767,
        };
        assert_eq!(decode_motion(&raw, 2, &table).unwrap(), [0.0, -32768.0, 0.0]);
    }

    #[test]
    fn test_motion_unknown_width() {
        let table = ScaleTable::standard();
        let raw = RawMotion {
            x: 1,
            y: 1,
            z: 1,
            scale: 2,
        };
        assert_eq!(
            decode_motion(&raw, 3, &table).unwrap_err(),
            DecodeFailure::UnknownByteWidth(3)
        );
    }

    #[test]
    fn test_batch_skips_bad_records_and_counts() {
        let table = ScaleTable::standard();
        let decoder = Decoder::new(&table, MotionByteWidths::default());
        let records = vec![
            position(1000, 2000, 0),
            gyro(i64::MAX, 2),
            gyro(1_073_741_824, 4),
        ];
        let report = decoder.decode_batch(&records);
        assert_eq!(report.readings.len(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.errors[0].record.serial_number.as_str(), "S2");

        match &report.readings[1] {
            Reading::Motion(m) => {
                assert_eq!(m.data_type, DataType::Gyroscope);
                assert!((m.axis[0] - 2.0).abs() < 1e-6);
                assert!((m.axis[2] + 2.0).abs() < 1e-6);
            }
            other => panic!("expected motion reading, got {:?}", other),
        }
    }

    #[test]
    fn test_motion_reading_serializes_axis_as_data() {
        let reading = MotionReading {
            data_type: DataType::Accelerometer,
            timestamp: ts(),
            serial_number: "S1".into(),
            axis: [1.0, 0.5, -0.25],
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["data"], serde_json::json!([1.0, 0.5, -0.25]));
        assert!(json.get("data_type").is_none());
    }
}
