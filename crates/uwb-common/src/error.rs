//! Error types for the UWB telemetry pipeline.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Retryability, which callers use to decide whether a whole ingestion
//!   call may be replayed
//! - Remediation suggestions for operators
//!
//! Crate-local errors (`WireError`, `ResolveError`, `IngestError`,
//! `ExportError`) convert into [`Error`] at crate boundaries.
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 42,
//!   "category": "write",
//!   "message": "rollback failed, 12 records need manual cleanup: ...",
//!   "retryable": false,
//!   "suggested_action": "manual_intervention"
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file and argument errors.
    Config,
    /// Identity, environment and coordinate-space resolution.
    Resolution,
    /// Wire parsing and fixed-point decoding.
    Decode,
    /// Writes against the query service and their compensation.
    Write,
    /// Bulk export and artifact sinks.
    Export,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Resolution => write!(f, "resolution"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Write => write!(f, "write"),
            ErrorCategory::Export => write!(f, "export"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for callers to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the whole call (possibly with backoff).
    Retry,
    /// Fix configuration and rerun.
    FixConfig,
    /// Fix assignment data in the identity store.
    FixAssignments,
    /// Skip this item and continue.
    Skip,
    /// Manual intervention required; do not retry.
    ManualIntervention,
    /// Abort the operation.
    Abort,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::FixAssignments => write!(f, "fix_assignments"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
            SuggestedAction::Abort => write!(f, "abort"),
        }
    }
}

/// Unified error type for the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    #[error("invalid time window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },

    // Resolution errors (20-29)
    #[error("no environment assignment overlaps {window}")]
    NoEnvironment { window: String },

    #[error("devices are assigned to multiple environments: {}", candidates.join(", "))]
    AmbiguousEnvironment { candidates: Vec<String> },

    #[error("no coordinate space found for environment {environment}")]
    NoCoordinateSpace { environment: String },

    #[error("environment {environment} has multiple coordinate spaces: {}", candidates.join(", "))]
    AmbiguousCoordinateSpace {
        environment: String,
        candidates: Vec<String>,
    },

    #[error("no environment named '{name}'")]
    UnknownEnvironment { name: String },

    // Decode errors (30-39)
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("malformed wire record: {0}")]
    MalformedWire(String),

    // Write errors (40-49)
    #[error("query service error: {0}")]
    Service(String),

    #[error("{data_type} write failed ({rolled_back} records rolled back): {message}")]
    Write {
        data_type: String,
        message: String,
        rolled_back: usize,
    },

    #[error("rollback failed, {remaining} records need manual cleanup: {message}")]
    RollbackFailed { message: String, remaining: usize },

    // Export errors (50-59)
    #[error("export failed: {0}")]
    Export(String),

    #[error("artifact sink error: {0}")]
    Sink(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Resolution errors
    /// - 30-39: Decode errors
    /// - 40-49: Write errors
    /// - 50-59: Export errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig { .. } => 11,
            Error::InvalidWindow { .. } => 12,
            Error::NoEnvironment { .. } => 21,
            Error::AmbiguousEnvironment { .. } => 22,
            Error::NoCoordinateSpace { .. } => 23,
            Error::AmbiguousCoordinateSpace { .. } => 24,
            Error::UnknownEnvironment { .. } => 25,
            Error::Decode(_) => 30,
            Error::MalformedWire(_) => 31,
            Error::Service(_) => 40,
            Error::Write { .. } => 41,
            Error::RollbackFailed { .. } => 42,
            Error::Export(_) => 50,
            Error::Sink(_) => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } | Error::InvalidWindow { .. } => {
                ErrorCategory::Config
            }

            Error::NoEnvironment { .. }
            | Error::AmbiguousEnvironment { .. }
            | Error::NoCoordinateSpace { .. }
            | Error::AmbiguousCoordinateSpace { .. }
            | Error::UnknownEnvironment { .. } => ErrorCategory::Resolution,

            Error::Decode(_) | Error::MalformedWire(_) => ErrorCategory::Decode,

            Error::Service(_) | Error::Write { .. } | Error::RollbackFailed { .. } => {
                ErrorCategory::Write
            }

            Error::Export(_) | Error::Sink(_) => ErrorCategory::Export,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether the failed call may be replayed as a whole.
    ///
    /// `RollbackFailed` is never retryable: records from the failed call may
    /// still exist and a replay would duplicate them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Service(_) => true,
            Error::Write { .. } => true,
            Error::Io(_) => true,
            Error::Sink(_) => true,

            Error::RollbackFailed { .. } => false,

            // Data problems: replaying gives the same answer
            Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::InvalidWindow { .. }
            | Error::NoEnvironment { .. }
            | Error::AmbiguousEnvironment { .. }
            | Error::NoCoordinateSpace { .. }
            | Error::AmbiguousCoordinateSpace { .. }
            | Error::UnknownEnvironment { .. }
            | Error::Decode(_)
            | Error::MalformedWire(_)
            | Error::Export(_)
            | Error::Json(_) => false,
        }
    }

    /// Returns the suggested action for callers.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } | Error::InvalidWindow { .. } => {
                SuggestedAction::FixConfig
            }

            Error::NoEnvironment { .. }
            | Error::AmbiguousEnvironment { .. }
            | Error::NoCoordinateSpace { .. }
            | Error::AmbiguousCoordinateSpace { .. } => SuggestedAction::FixAssignments,
            Error::UnknownEnvironment { .. } => SuggestedAction::FixConfig,

            Error::Decode(_) | Error::MalformedWire(_) => SuggestedAction::Skip,

            Error::Service(_) | Error::Write { .. } => SuggestedAction::Retry,
            Error::RollbackFailed { .. } => SuggestedAction::ManualIntervention,

            Error::Export(_) => SuggestedAction::Abort,
            Error::Sink(_) | Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::Abort,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } => {
                "Check the pipeline TOML file; zero chunk sizes and zero scale divisors are rejected."
            }
            Error::InvalidWindow { .. } => "Swap or correct the window bounds so start <= end.",

            Error::NoEnvironment { .. } => {
                "Create an environment assignment covering the observation window for these devices."
            }
            Error::AmbiguousEnvironment { .. } => {
                "Devices in one call must share one environment; split the call or end the stale assignment."
            }
            Error::NoCoordinateSpace { .. } => {
                "Create a coordinate space for the environment that covers the observation window."
            }
            Error::AmbiguousCoordinateSpace { .. } => {
                "End all but one coordinate space for the environment within the observation window."
            }
            Error::UnknownEnvironment { .. } => {
                "Check the environment name; it must match exactly one environment."
            }

            Error::Decode(_) | Error::MalformedWire(_) => {
                "The record was skipped. Inspect the raw datapoint for out-of-range or malformed fields."
            }

            Error::Service(_) | Error::Write { .. } => {
                "All writes of the failed call were rolled back. Retry the whole call."
            }
            Error::RollbackFailed { .. } => {
                "Delete the listed record ids manually before retrying; automatic retry would duplicate data."
            }

            Error::Export(_) => "Check the export scope (environment name and time range).",
            Error::Sink(_) => "Check sink credentials, bucket permissions, or disk space, then rerun.",

            Error::Io(_) => "Check disk space, permissions, and that output directories exist.",
            Error::Json(_) => "Inspect the offending payload; it is not valid JSON for the expected shape.",
        }
    }
}

/// Structured error for JSON reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
    pub suggested_action: SuggestedAction,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            suggested_action: err.suggested_action(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(
            Error::AmbiguousEnvironment {
                candidates: vec!["a".into()]
            }
            .code(),
            22
        );
        assert_eq!(
            Error::RollbackFailed {
                message: "x".into(),
                remaining: 1
            }
            .code(),
            42
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::NoCoordinateSpace {
                environment: "e".into()
            }
            .category(),
            ErrorCategory::Resolution
        );
        assert_eq!(Error::Sink("x".into()).category(), ErrorCategory::Export);
    }

    #[test]
    fn test_rollback_failure_is_never_retryable() {
        let err = Error::RollbackFailed {
            message: "delete timed out".into(),
            remaining: 3,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.suggested_action(), SuggestedAction::ManualIntervention);
    }

    #[test]
    fn test_write_error_is_retryable() {
        let err = Error::Write {
            data_type: "gyroscope".into(),
            message: "timeout".into(),
            rolled_back: 10,
        };
        assert!(err.is_retryable());
        assert_eq!(err.suggested_action(), SuggestedAction::Retry);
    }

    #[test]
    fn test_ambiguous_environment_lists_candidates() {
        let err = Error::AmbiguousEnvironment {
            candidates: vec!["lab-a".into(), "lab-b".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("lab-a"));
        assert!(msg.contains("lab-b"));
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::Sink("bucket missing".into());
        let structured = StructuredError::from(&err);
        let json = serde_json::to_value(&structured).unwrap();
        assert_eq!(json["code"], 51);
        assert_eq!(json["category"], "export");
        assert_eq!(json["suggested_action"], "retry");
    }
}
