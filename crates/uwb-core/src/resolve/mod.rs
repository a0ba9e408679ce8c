//! Identity and coordinate-space resolution.
//!
//! Resolution runs against the query service once per call; nothing is
//! cached between calls.

pub mod assignment;
pub mod coordinate;
pub mod identity;

pub use assignment::{Assignment, AssignmentLookup, Environment};
pub use coordinate::{CoordinateSpaceResolver, ResolvedSpace};
pub use identity::{DeviceIdentity, IdentityResolver};

use thiserror::Error;
use uwb_common::TimeWindow;

use crate::service::{Filter, ServiceError};

/// Resolution failures that are fatal for the affected call.
///
/// Unresolved serial numbers are not errors; they are logged and omitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("no environment assignment overlaps {window}")]
    NoEnvironment { window: TimeWindow },

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
}

impl From<ResolveError> for uwb_common::Error {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Service(e) => e.into(),
            ResolveError::NoEnvironment { window } => uwb_common::Error::NoEnvironment {
                window: window.to_string(),
            },
            ResolveError::AmbiguousEnvironment { candidates } => {
                uwb_common::Error::AmbiguousEnvironment { candidates }
            }
            ResolveError::NoCoordinateSpace { environment } => {
                uwb_common::Error::NoCoordinateSpace { environment }
            }
            ResolveError::AmbiguousCoordinateSpace {
                environment,
                candidates,
            } => uwb_common::Error::AmbiguousCoordinateSpace {
                environment,
                candidates,
            },
            ResolveError::UnknownEnvironment { name } => {
                uwb_common::Error::UnknownEnvironment { name }
            }
        }
    }
}

/// Records whose `[start, end]` (open-ended when `end` is null) overlaps
/// `window`: `start <= window.end AND (end IS NULL OR end >= window.start)`.
pub fn overlap_filter(window: &TimeWindow) -> Filter {
    Filter::and(vec![
        Filter::lte("start", window.end.to_rfc3339()),
        Filter::or(vec![
            Filter::is_null("end"),
            Filter::gte("end", window.start.to_rfc3339()),
        ]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn record(value: serde_json::Value) -> crate::Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_overlap_filter_bounds() {
        let w = window();
        let f = overlap_filter(&w);
        let cases = [
            (json!({"start": "2023-12-31T00:00:00Z", "end": null}), true),
            (json!({"start": "2023-12-31T00:00:00Z", "end": "2024-01-01T00:00:00Z"}), true),
            (json!({"start": "2023-12-31T00:00:00Z", "end": "2023-12-31T23:59:59Z"}), false),
            (json!({"start": "2024-01-01T12:00:00Z"}), true),
            (json!({"start": "2024-01-01T12:00:01Z", "end": null}), false),
        ];
        for (value, expected) in cases {
            let r = record(value);
            assert_eq!(f.matches(&r), expected, "{:?}", r);
        }
    }

    #[test]
    fn test_ambiguous_environment_converts_with_candidates() {
        let err: uwb_common::Error = ResolveError::AmbiguousEnvironment {
            candidates: vec!["lab-a".into(), "lab-b".into()],
        }
        .into();
        assert_eq!(err.code(), 22);
        assert!(err.to_string().contains("lab-a, lab-b"));
    }
}
