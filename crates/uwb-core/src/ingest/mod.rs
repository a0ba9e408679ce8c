//! Saga-protected ingestion of raw wire records.

pub mod observation;
pub mod orchestrator;
pub mod saga;

pub use observation::DecodedObservation;
pub use orchestrator::{IngestError, IngestReport, Orchestrator, TypeReport};
pub use saga::{CommittedBatch, RollbackError, RollbackReport, Saga};
