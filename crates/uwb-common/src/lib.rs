//! UWB telemetry common types, IDs, and errors.
//!
//! This crate provides foundational types shared by the pipeline crates:
//! - Identity newtypes for devices, environments, coordinate spaces and records
//! - The supported sensor data types and their fixed processing order
//! - Time windows with the assignment overlap rule
//! - The unified error taxonomy
//! - Configuration loading and validation

pub mod config;
pub mod data_type;
pub mod error;
pub mod id;
pub mod window;

pub use config::{ConfigResolver, ConfigSource, LoadedConfig, PipelineConfig};
pub use data_type::DataType;
pub use error::{Error, ErrorCategory, Result, SuggestedAction};
pub use id::{
    AssignmentId, CoordinateSpaceId, DatapointId, DeviceId, EnvironmentId, RecordId, SerialNumber,
};
pub use window::TimeWindow;
