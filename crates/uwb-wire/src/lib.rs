//! CUWB wire protocol parsing and fixed-point decoding.
//!
//! This crate provides:
//! - Typed raw wire records parsed from newline-delimited JSON
//! - The byte-width scale table used by motion sensors
//! - Pure per-record decoders producing physically scaled readings
//!
//! Decoding never touches identity: readings carry the wire serial number
//! and callers attach resolved devices afterwards.

pub mod decode;
pub mod error;
pub mod scale;
pub mod wire;

pub use decode::{
    decode_motion, decode_position, DecodeReport, Decoder, MotionReading, PositionReading,
    Reading,
};
pub use error::{DecodeError, DecodeFailure, WireError};
pub use scale::ScaleTable;
pub use wire::{
    parse_jsonl, parse_line, ParseReport, RawBatches, RawMotion, RawObservation, RawPayload,
    RawPosition,
};

/// Millimeters per meter for position fields.
pub const MILLIMETERS_PER_METER: f64 = 1000.0;
