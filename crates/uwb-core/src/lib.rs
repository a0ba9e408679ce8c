//! UWB Telemetry Core Library
//!
//! This library provides the ingestion and status side of the pipeline:
//! - Contracts for the external query service and datapoint store
//! - Serial-to-identity and coordinate-space resolution
//! - Saga-protected, chunked ingestion of decoded observations
//! - Per-device latest-value status aggregation
//! - Structured logging setup

pub mod ingest;
pub mod logging;
pub mod resolve;
pub mod service;
pub mod status;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use ingest::{
    CommittedBatch, DecodedObservation, IngestError, IngestReport, Orchestrator, RollbackError,
    RollbackReport, Saga, TypeReport,
};
pub use resolve::{
    Assignment, AssignmentLookup, CoordinateSpaceResolver, DeviceIdentity, Environment,
    IdentityResolver, ResolveError, ResolvedSpace,
};
pub use service::{
    Datapoint, DatapointStore, DeleteStatus, Filter, ObjectType, QueryService, Record,
    ServiceError,
};
pub use status::{ModalityStatus, StatusAggregator, StatusRow, StatusTable};
