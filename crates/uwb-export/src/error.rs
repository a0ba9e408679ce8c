//! Export error types.

use thiserror::Error;
use uwb_core::{ResolveError, ServiceError};
use uwb_wire::WireError;

/// Errors from export scope resolution, artifact building and sinks.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Config(#[from] uwb_common::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("datapoint {datapoint_id} is malformed: {message}")]
    MalformedDatapoint {
        datapoint_id: String,
        message: String,
    },

    #[error("sink error for {key}: {message}")]
    Sink { key: String, message: String },

    #[error("invalid sink configuration: {0}")]
    SinkConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ExportError> for uwb_common::Error {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Config(e) => e,
            ExportError::Resolve(e) => e.into(),
            ExportError::Service(e) => e.into(),
            ExportError::Wire(e) => e.into(),
            ExportError::MalformedDatapoint { .. } => uwb_common::Error::Export(err.to_string()),
            ExportError::Sink { .. } => uwb_common::Error::Sink(err.to_string()),
            ExportError::SinkConfig(message) => uwb_common::Error::InvalidConfig {
                field: "export.sink".to_string(),
                message,
            },
            ExportError::Io(e) => uwb_common::Error::Io(e),
            ExportError::Json(e) => uwb_common::Error::Json(e),
        }
    }
}
