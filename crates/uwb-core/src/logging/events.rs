//! Event names used as `tracing` targets, so a JSONL consumer can filter
//! on them directly.

/// Standard event names used in logging.
pub mod event_names {
    // Resolution
    pub const RESOLVE_IDENTITIES: &str = "resolve.identities";
    pub const RESOLVE_UNRESOLVED: &str = "resolve.unresolved";
    pub const RESOLVE_SPACE: &str = "resolve.coordinate_space";

    // Decode
    pub const DECODE_SKIPPED: &str = "decode.skipped";

    // Ingestion call lifecycle
    pub const INGEST_STARTED: &str = "ingest.started";
    pub const INGEST_EMPTY_INPUT: &str = "ingest.empty_input";
    pub const INGEST_TYPE_COMMITTED: &str = "ingest.type_committed";
    pub const INGEST_FINISHED: &str = "ingest.finished";
    pub const INGEST_FAILED: &str = "ingest.failed";

    // Compensation
    pub const ROLLBACK_STARTED: &str = "ingest.rollback_started";
    pub const ROLLBACK_COMPLETED: &str = "ingest.rollback_completed";
    pub const ROLLBACK_FAILED: &str = "ingest.rollback_failed";

    // Status
    pub const STATUS_QUERIED: &str = "status.queried";

    // Export
    pub const EXPORT_STARTED: &str = "export.started";
    pub const EXPORT_ARTIFACT_WRITTEN: &str = "export.artifact_written";
    pub const EXPORT_DATAPOINT_EMPTY: &str = "export.datapoint_empty";
    pub const EXPORT_DATAPOINT_FAILED: &str = "export.datapoint_failed";
    pub const EXPORT_FINISHED: &str = "export.finished";
}
