//! Decoded observations bound to resolved identities.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uwb_common::{CoordinateSpaceId, DataType, DeviceId};
use uwb_wire::{MotionReading, PositionReading};

use crate::service::{ObjectType, Record};

/// Position records written by this pipeline are measurements, not estimates.
pub const POSITION_SOURCE_TYPE: &str = "MEASURED";

/// An observation ready to be written.
///
/// Only constructible from a decoded reading plus a resolved device, so an
/// unresolved serial can never reach the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodedObservation {
    Position {
        timestamp: DateTime<Utc>,
        coordinates: [f64; 3],
        quality: u32,
        anchor_count: u32,
        device: DeviceId,
        coordinate_space: CoordinateSpaceId,
    },
    Motion {
        data_type: DataType,
        timestamp: DateTime<Utc>,
        axis: [f64; 3],
        device: DeviceId,
    },
}

fn timestamp_value(ts: &DateTime<Utc>) -> Value {
    Value::from(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl DecodedObservation {
    pub fn position(
        reading: &PositionReading,
        device: DeviceId,
        coordinate_space: CoordinateSpaceId,
    ) -> Self {
        DecodedObservation::Position {
            timestamp: reading.timestamp,
            coordinates: reading.coordinates,
            quality: reading.quality,
            anchor_count: reading.anchor_count,
            device,
            coordinate_space,
        }
    }

    pub fn motion(reading: &MotionReading, device: DeviceId) -> Self {
        DecodedObservation::Motion {
            data_type: reading.data_type,
            timestamp: reading.timestamp,
            axis: reading.axis,
            device,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DecodedObservation::Position { .. } => DataType::Position,
            DecodedObservation::Motion { data_type, .. } => *data_type,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        ObjectType::for_data_type(self.data_type())
    }

    pub fn device(&self) -> &DeviceId {
        match self {
            DecodedObservation::Position { device, .. }
            | DecodedObservation::Motion { device, .. } => device,
        }
    }

    /// The record shape the query service stores for this type.
    pub fn to_record(&self) -> Record {
        let value = match self {
            DecodedObservation::Position {
                timestamp,
                coordinates,
                quality,
                anchor_count,
                device,
                coordinate_space,
            } => json!({
                "timestamp": timestamp_value(timestamp),
                "coordinates": coordinates,
                "quality": quality,
                "anchor_count": anchor_count,
                "object": device.as_str(),
                "coordinate_space": coordinate_space.as_str(),
                "source_type": POSITION_SOURCE_TYPE,
            }),
            DecodedObservation::Motion {
                timestamp,
                axis,
                device,
                ..
            } => json!({
                "timestamp": timestamp_value(timestamp),
                "device": device.as_str(),
                "data": axis,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_position_record_shape() {
        let reading = PositionReading {
            timestamp: ts(),
            serial_number: "S1".into(),
            coordinates: [1.0, 2.0, 0.0],
            quality: 80,
            anchor_count: 4,
        };
        let obs = DecodedObservation::position(&reading, "D1".into(), "SPACE-1".into());
        assert_eq!(obs.object_type(), ObjectType::Position);

        let record = obs.to_record();
        assert_eq!(record["coordinates"], json!([1.0, 2.0, 0.0]));
        assert_eq!(record["quality"], 80);
        assert_eq!(record["object"], "D1");
        assert_eq!(record["coordinate_space"], "SPACE-1");
        assert_eq!(record["timestamp"], "2024-01-01T00:00:00.000000Z");
        assert!(record.get("device").is_none());
    }

    #[test]
    fn test_motion_record_links_device() {
        let reading = MotionReading {
            data_type: DataType::Gyroscope,
            timestamp: ts(),
            serial_number: "S2".into(),
            axis: [0.5, -0.5, 0.0],
        };
        let obs = DecodedObservation::motion(&reading, "D2".into());
        assert_eq!(obs.object_type(), ObjectType::Gyroscope);
        assert_eq!(obs.device().as_str(), "D2");

        let record = obs.to_record();
        assert_eq!(record["device"], "D2");
        assert_eq!(record["data"], json!([0.5, -0.5, 0.0]));
        assert!(record.get("object").is_none());
    }
}
