//! Configuration loading and validation for the pipeline.
//!
//! This module provides:
//! - Typed configuration sections (resolver, ingest, decode, export)
//! - Deterministic config resolution (explicit path > env > XDG > system > defaults)
//! - Semantic validation

pub mod resolve;
pub mod validate;

pub use resolve::{ConfigResolver, ConfigSource, LoadedConfig};
pub use validate::validate_config;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::error::{Error, Result};

/// Default number of serials per identity lookup query.
pub const DEFAULT_RESOLVER_CHUNK_SIZE: usize = 100;

/// Default number of records per create call.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 1000;

/// Default device type accepted by the identity resolver.
pub const DEFAULT_DEVICE_TYPE: &str = "UWBTAG";

/// The complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub resolver: ResolverConfig,
    pub ingest: IngestConfig,
    pub decode: DecodeConfig,
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Serial-to-identity lookup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Serial numbers per lookup query.
    pub chunk_size: usize,
    /// Device types a serial may resolve to.
    pub device_types: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            chunk_size: DEFAULT_RESOLVER_CHUNK_SIZE,
            device_types: vec![DEFAULT_DEVICE_TYPE.to_string()],
        }
    }
}

/// Write-path settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records per create call.
    pub write_chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
        }
    }
}

/// Byte widths every decoder knows without configuration.
pub const STANDARD_BYTE_WIDTHS: [u8; 3] = [1, 2, 4];

/// Largest signed value of a `byte_width`-byte field, the fixed divisor for
/// that width. `None` outside 1..=8 bytes.
pub fn signed_max(byte_width: u8) -> Option<i64> {
    match byte_width {
        1..=8 => Some(i64::MAX >> (64 - 8 * u32::from(byte_width))),
        _ => None,
    }
}

/// One row of the fixed-point scale table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleEntry {
    pub byte_width: u8,
    pub max_int: i64,
}

/// Fixed-point decode settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Widths beyond [`STANDARD_BYTE_WIDTHS`]. Each divisor must equal
    /// [`signed_max`] for its width.
    pub scale_table: Vec<ScaleEntry>,
    /// Byte width of the raw axis fields per motion type.
    pub motion_byte_width: MotionByteWidths,
}

/// Raw axis byte width for each motion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionByteWidths {
    pub accelerometer: u8,
    pub gyroscope: u8,
    pub magnetometer: u8,
}

impl Default for MotionByteWidths {
    fn default() -> Self {
        MotionByteWidths {
            accelerometer: 4,
            gyroscope: 4,
            magnetometer: 4,
        }
    }
}

impl MotionByteWidths {
    /// Byte width for a motion type; `None` for position.
    pub fn for_type(&self, data_type: DataType) -> Option<u8> {
        match data_type {
            DataType::Position => None,
            DataType::Accelerometer => Some(self.accelerometer),
            DataType::Gyroscope => Some(self.gyroscope),
            DataType::Magnetometer => Some(self.magnetometer),
        }
    }
}

/// Bulk export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Gzip artifacts in memory before handing them to the sink.
    pub gzip: bool,
    /// Datapoints exported concurrently.
    pub workers: usize,
    /// Assignment ids per datapoint listing query.
    pub query_chunk_size: usize,
    /// Where artifacts go.
    pub sink: SinkConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            gzip: true,
            workers: 1,
            query_chunk_size: DEFAULT_RESOLVER_CHUNK_SIZE,
            sink: SinkConfig::default(),
        }
    }
}

/// Artifact destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Local filesystem under `base_dir`.
    Local { base_dir: PathBuf },
    /// Object storage bucket, keys optionally prefixed.
    Object {
        bucket: String,
        #[serde(default)]
        prefix: String,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Local {
            base_dir: default_export_dir(),
        }
    }
}

/// Default local export directory under the XDG data dir.
pub fn default_export_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uwb-pipeline")
        .join("exports")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.ingest.write_chunk_size, 1000);
        assert_eq!(config.resolver.chunk_size, 100);
        assert_eq!(config.resolver.device_types, vec!["UWBTAG".to_string()]);
        assert!(config.decode.scale_table.is_empty());
        assert!(config.export.gzip);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [ingest]
            write_chunk_size = 250

            [export]
            gzip = false
            sink = { kind = "object", bucket = "uwb-archive", prefix = "raw" }
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.write_chunk_size, 250);
        assert_eq!(config.resolver.chunk_size, 100);
        assert!(!config.export.gzip);
        assert_eq!(
            config.export.sink,
            SinkConfig::Object {
                bucket: "uwb-archive".into(),
                prefix: "raw".into()
            }
        );
    }

    #[test]
    fn test_scale_table_from_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [[decode.scale_table]]
            byte_width = 3
            max_int = 8388607

            [decode.motion_byte_width]
            accelerometer = 2
            gyroscope = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.decode.scale_table.len(), 1);
        assert_eq!(
            config.decode.motion_byte_width.for_type(DataType::Gyroscope),
            Some(3)
        );
        assert_eq!(
            config.decode.motion_byte_width.for_type(DataType::Magnetometer),
            Some(4)
        );
        assert_eq!(
            config.decode.motion_byte_width.for_type(DataType::Position),
            None
        );
    }

    #[test]
    fn test_custom_divisor_in_toml_is_rejected() {
        let err = PipelineConfig::from_toml_str(
            "[[decode.scale_table]]\nbyte_width = 4\nmax_int = 1000\n",
        )
        .unwrap_err();
        assert_eq!(err.code(), 11);
    }

    #[test]
    fn test_signed_max_per_width() {
        assert_eq!(signed_max(1), Some(127));
        assert_eq!(signed_max(2), Some(32_767));
        assert_eq!(signed_max(3), Some(8_388_607));
        assert_eq!(signed_max(4), Some(2_147_483_647));
        assert_eq!(signed_max(8), Some(i64::MAX));
        assert_eq!(signed_max(0), None);
        assert_eq!(signed_max(9), None);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("[ingest\nwrite_chunk_size = ").unwrap_err();
        assert_eq!(err.code(), 10);
    }
}
