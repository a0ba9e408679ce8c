//! Sensor data types carried by the CUWB wire protocol.

use serde::{Deserialize, Serialize};

/// A supported observation type.
///
/// The wire protocol also emits other record types; those have no variant
/// here and are ignored by every stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Tag position in millimeters.
    Position,
    /// Raw accelerometer axes.
    Accelerometer,
    /// Raw gyroscope axes.
    Gyroscope,
    /// Raw magnetometer axes.
    Magnetometer,
}

impl DataType {
    /// Fixed order in which an ingestion call processes types.
    pub const PROCESSING_ORDER: [DataType; 4] = [
        DataType::Position,
        DataType::Accelerometer,
        DataType::Gyroscope,
        DataType::Magnetometer,
    ];

    /// Wire/serialization name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Position => "position",
            DataType::Accelerometer => "accelerometer",
            DataType::Gyroscope => "gyroscope",
            DataType::Magnetometer => "magnetometer",
        }
    }

    /// Parse a wire `type` value. Unsupported types yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "position" => Some(DataType::Position),
            "accelerometer" => Some(DataType::Accelerometer),
            "gyroscope" => Some(DataType::Gyroscope),
            "magnetometer" => Some(DataType::Magnetometer),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
