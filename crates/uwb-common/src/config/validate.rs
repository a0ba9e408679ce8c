//! Semantic validation of a parsed configuration.

use std::collections::HashSet;

use super::{signed_max, PipelineConfig, STANDARD_BYTE_WIDTHS};
use crate::data_type::DataType;
use crate::error::{Error, Result};

fn invalid(field: impl Into<String>, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        field: field.into(),
        message: message.into(),
    }
}

/// Validate a configuration semantically.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.resolver.chunk_size == 0 {
        return Err(invalid("resolver.chunk_size", "must be at least 1"));
    }
    if config.resolver.device_types.is_empty() {
        return Err(invalid(
            "resolver.device_types",
            "at least one device type is required",
        ));
    }
    if config.ingest.write_chunk_size == 0 {
        return Err(invalid("ingest.write_chunk_size", "must be at least 1"));
    }
    if config.export.workers == 0 {
        return Err(invalid("export.workers", "must be at least 1"));
    }
    if config.export.query_chunk_size == 0 {
        return Err(invalid("export.query_chunk_size", "must be at least 1"));
    }

    let mut widths: HashSet<u8> = STANDARD_BYTE_WIDTHS.into_iter().collect();
    let mut configured = HashSet::new();
    for entry in &config.decode.scale_table {
        let field = format!("decode.scale_table[{}].max_int", entry.byte_width);
        let Some(expected) = signed_max(entry.byte_width) else {
            return Err(invalid(
                "decode.scale_table",
                format!("unsupported byte width {}", entry.byte_width),
            ));
        };
        if entry.max_int != expected {
            return Err(invalid(
                field,
                format!(
                    "divisor for {}-byte fields is fixed at {}, got {}",
                    entry.byte_width, expected, entry.max_int
                ),
            ));
        }
        if !configured.insert(entry.byte_width) {
            return Err(invalid(
                "decode.scale_table",
                format!("byte width {} listed twice", entry.byte_width),
            ));
        }
        widths.insert(entry.byte_width);
    }

    for data_type in DataType::PROCESSING_ORDER {
        if let Some(width) = config.decode.motion_byte_width.for_type(data_type) {
            if !widths.contains(&width) {
                return Err(invalid(
                    format!("decode.motion_byte_width.{}", data_type),
                    format!("byte width {} has no scale table entry", width),
                ));
            }
        }
    }

    Ok(())
}
