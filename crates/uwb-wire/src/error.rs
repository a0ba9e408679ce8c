//! Error types for wire parsing and decoding.

use thiserror::Error;

use crate::wire::RawObservation;

/// Errors from parsing wire records or building decode tables.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {record_type} record: {message}")]
    InvalidRecord {
        record_type: String,
        message: String,
    },

    #[error("invalid scale table entry for {byte_width}-byte fields: divisor {max_int}")]
    InvalidScale { byte_width: u8, max_int: i64 },
}

/// Why a single record could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("axis {axis} value {value} is outside the signed {byte_width}-byte range (max {max})")]
    AxisOutOfRange {
        axis: char,
        value: i64,
        max: i64,
        byte_width: u8,
    },

    #[error("no scale table entry for {0}-byte fields")]
    UnknownByteWidth(u8),

    #[error("field {field} value {value} out of range")]
    FieldOutOfRange { field: &'static str, value: i64 },
}

/// A decode failure together with the offending record.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot decode {} record from {} at {}: {failure}",
    .record.data_type(), .record.serial_number, .record.timestamp.to_rfc3339())]
pub struct DecodeError {
    pub record: Box<RawObservation>,
    pub failure: DecodeFailure,
}

impl DecodeError {
    pub fn new(record: &RawObservation, failure: DecodeFailure) -> Self {
        DecodeError {
            record: Box::new(record.clone()),
            failure,
        }
    }
}

impl From<WireError> for uwb_common::Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Json(e) => uwb_common::Error::Json(e),
            WireError::InvalidRecord { .. } => uwb_common::Error::MalformedWire(err.to_string()),
            WireError::InvalidScale { .. } => uwb_common::Error::InvalidConfig {
                field: "decode.scale_table".to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl From<DecodeError> for uwb_common::Error {
    fn from(err: DecodeError) -> Self {
        uwb_common::Error::Decode(err.to_string())
    }
}
