//! UWB Telemetry Bulk Export
//!
//! Materializes stored raw datapoints for an `(environment, time range)`
//! scope as one decoded JSON artifact per datapoint:
//! - Scope resolution (environment, tag devices, assignments, datapoints)
//! - Artifact naming, encoding and optional gzip
//! - Local filesystem and object storage sinks
//! - Collect-and-continue pipeline with an optional worker pool

pub mod artifact;
pub mod error;
pub mod pipeline;
pub mod scope;
pub mod sink;

pub use artifact::{
    artifact_key, build_artifact, build_body, decode_body, encode_body, Artifact, ArtifactBody,
};
pub use error::ExportError;
pub use pipeline::{ExportFailure, ExportPipeline, ExportReport, ExportedArtifact};
pub use scope::{list_datapoints, resolve_scope, ExportScope, ResolvedScope};
pub use sink::{build_sink, ArtifactLocation, ArtifactSink, LocalSink, ObjectSink, ObjectStorage};

#[cfg(any(test, feature = "test-utils"))]
pub use sink::MemoryObjectStorage;
