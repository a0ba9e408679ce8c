//! Contracts for the external query service and datapoint store.
//!
//! The transport (GraphQL, REST, ...) lives outside this crate. The pipeline
//! only needs four blocking operations on typed object collections plus raw
//! datapoint retrieval. Filters are a typed expression tree so a transport
//! can render them into its own query language.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uwb_common::{AssignmentId, DataType, DatapointId, RecordId};

/// A loosely typed record as exchanged with the query service.
pub type Record = serde_json::Map<String, Value>;

static NULL: Value = Value::Null;

/// Object collections the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Device,
    Environment,
    Assignment,
    CoordinateSpace,
    Datapoint,
    Position,
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Device => "device",
            ObjectType::Environment => "environment",
            ObjectType::Assignment => "assignment",
            ObjectType::CoordinateSpace => "coordinate_space",
            ObjectType::Datapoint => "datapoint",
            ObjectType::Position => "position",
            ObjectType::Accelerometer => "accelerometer_data",
            ObjectType::Gyroscope => "gyroscope_data",
            ObjectType::Magnetometer => "magnetometer_data",
        }
    }

    /// Field holding the record's own id.
    pub fn id_field(&self) -> &'static str {
        match self {
            ObjectType::Device => "device_id",
            ObjectType::Environment => "environment_id",
            ObjectType::Assignment => "assignment_id",
            ObjectType::CoordinateSpace => "space_id",
            ObjectType::Datapoint => "data_id",
            ObjectType::Position
            | ObjectType::Accelerometer
            | ObjectType::Gyroscope
            | ObjectType::Magnetometer => "record_id",
        }
    }

    /// Target store for observations of a data type.
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Position => ObjectType::Position,
            DataType::Accelerometer => ObjectType::Accelerometer,
            DataType::Gyroscope => ObjectType::Gyroscope,
            DataType::Magnetometer => ObjectType::Magnetometer,
        }
    }

    /// Field linking an observation record to its device.
    ///
    /// Position records link through `object` (positions may belong to
    /// non-device objects in the wider schema); motion records through
    /// `device`.
    pub fn device_field(&self) -> Option<&'static str> {
        match self {
            ObjectType::Position => Some("object"),
            ObjectType::Accelerometer | ObjectType::Gyroscope | ObjectType::Magnetometer => {
                Some("device")
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter expression over record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Lte { field: String, value: Value },
    Gte { field: String, value: Value },
    IsNull { field: String },
    And { operands: Vec<Filter> },
    Or { operands: Vec<Filter> },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_null(field: &str) -> Self {
        Filter::IsNull {
            field: field.to_string(),
        }
    }

    pub fn and(operands: Vec<Filter>) -> Self {
        Filter::And { operands }
    }

    pub fn or(operands: Vec<Filter>) -> Self {
        Filter::Or { operands }
    }

    /// Evaluate against a record.
    ///
    /// Missing fields behave like `null`. Ordering comparisons treat two
    /// RFC 3339 strings as instants, numbers numerically, and other strings
    /// lexically; anything else never matches.
    pub fn matches(&self, record: &Record) -> bool {
        let get = |field: &str| record.get(field).unwrap_or(&NULL);
        match self {
            Filter::Eq { field, value } => get(field) == value,
            Filter::In { field, values } => values.iter().any(|v| v == get(field)),
            Filter::Lte { field, value } => matches!(
                compare_values(get(field), value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::Gte { field, value } => matches!(
                compare_values(get(field), value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::IsNull { field } => get(field).is_null(),
            Filter::And { operands } => operands.iter().all(|f| f.matches(record)),
            Filter::Or { operands } => operands.iter().any(|f| f.matches(record)),
        }
    }
}

/// Order two JSON scalars the way the query service does.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Per-id outcome of a delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleted,
    NotFound,
    Failed { reason: String },
}

impl DeleteStatus {
    /// Whether the record is gone after the call.
    pub fn is_gone(&self) -> bool {
        matches!(self, DeleteStatus::Deleted | DeleteStatus::NotFound)
    }
}

/// Errors reported by the external services.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{object_type} request rejected: {message}")]
    Rejected {
        object_type: ObjectType,
        message: String,
    },

    #[error("{object_type} {id} not found")]
    NotFound { object_type: ObjectType, id: String },

    #[error("malformed {object_type} record: {message}")]
    MalformedRecord {
        object_type: ObjectType,
        message: String,
    },
}

impl From<ServiceError> for uwb_common::Error {
    fn from(err: ServiceError) -> Self {
        uwb_common::Error::Service(err.to_string())
    }
}

/// Identity/query service.
///
/// All calls block; callers enforce their own timeouts.
pub trait QueryService: Send + Sync {
    /// All records matching `filter`, projected to `return_fields` (all
    /// fields when empty). `chunk_size` is the page size the transport uses.
    fn search(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        return_fields: &[&str],
        chunk_size: usize,
    ) -> Result<Vec<Record>, ServiceError>;

    /// The matching record with the greatest `timestamp_field`, if any.
    fn fetch_latest(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        timestamp_field: &str,
    ) -> Result<Option<Record>, ServiceError>;

    /// Create records; returns their ids in input order.
    fn create(&self, object_type: ObjectType, records: &[Record])
        -> Result<Vec<RecordId>, ServiceError>;

    /// Delete records by id; returns one status per id in input order.
    fn delete(
        &self,
        object_type: ObjectType,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteStatus>, ServiceError>;
}

/// A stored container of raw wire records from one capture window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub id: DatapointId,
    pub timestamp: DateTime<Utc>,
    pub source_assignment_id: AssignmentId,
    pub raw_jsonl_blob: String,
}

/// Raw datapoint retrieval.
pub trait DatapointStore: Send + Sync {
    fn get_datapoint(&self, id: &DatapointId) -> Result<Datapoint, ServiceError>;
}

/// Required string field of a service record.
pub fn field_str<'r>(
    record: &'r Record,
    object_type: ObjectType,
    field: &str,
) -> Result<&'r str, ServiceError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::MalformedRecord {
            object_type,
            message: format!("missing string field '{}'", field),
        })
}

/// Optional timestamp field of a service record (`null`/absent is `None`).
pub fn field_time(
    record: &Record,
    object_type: ObjectType,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ServiceError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| ServiceError::MalformedRecord {
                object_type,
                message: format!("field '{}' is not RFC 3339: {}", field, e),
            }),
        Some(other) => Err(ServiceError::MalformedRecord {
            object_type,
            message: format!("field '{}' is not a timestamp: {}", field, other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_filter_eq_and_in() {
        let r = record(json!({"device": "D1", "n": 3}));
        assert!(Filter::eq("device", "D1").matches(&r));
        assert!(!Filter::eq("device", "D2").matches(&r));
        assert!(Filter::is_in("device", ["D2", "D1"]).matches(&r));
        assert!(!Filter::is_in("device", Vec::<String>::new()).matches(&r));
    }

    #[test]
    fn test_filter_timestamps_compare_as_instants() {
        let r = record(json!({"start": "2024-01-01T01:00:00+01:00"}));
        // 00:00Z == 01:00+01:00
        assert!(Filter::lte("start", "2024-01-01T00:00:00Z").matches(&r));
        assert!(Filter::gte("start", "2024-01-01T00:00:00Z").matches(&r));
        assert!(!Filter::gte("start", "2024-01-01T00:00:01Z").matches(&r));
    }

    #[test]
    fn test_filter_null_handling() {
        let r = record(json!({"end": null}));
        assert!(Filter::is_null("end").matches(&r));
        assert!(Filter::is_null("missing").matches(&r));
        assert!(!Filter::gte("end", "2024-01-01T00:00:00Z").matches(&r));
        let overlap = Filter::or(vec![
            Filter::is_null("end"),
            Filter::gte("end", "2024-01-01T00:00:00Z"),
        ]);
        assert!(overlap.matches(&r));
    }

    #[test]
    fn test_filter_serializes_for_transport() {
        let f = Filter::and(vec![Filter::eq("a", 1), Filter::is_null("b")]);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["op"], "and");
        assert_eq!(json["operands"][0]["op"], "eq");
        let back: Filter = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn test_field_helpers() {
        let r = record(json!({"name": "lab", "end": null, "start": "2024-01-01T00:00:00Z", "n": 1}));
        assert_eq!(field_str(&r, ObjectType::Environment, "name").unwrap(), "lab");
        assert!(field_str(&r, ObjectType::Environment, "n").is_err());
        assert!(field_time(&r, ObjectType::Assignment, "end").unwrap().is_none());
        assert!(field_time(&r, ObjectType::Assignment, "start").unwrap().is_some());
        assert!(field_time(&r, ObjectType::Assignment, "n").is_err());
    }

    #[test]
    fn test_object_type_mapping() {
        assert_eq!(
            ObjectType::for_data_type(DataType::Position).device_field(),
            Some("object")
        );
        assert_eq!(
            ObjectType::for_data_type(DataType::Magnetometer).device_field(),
            Some("device")
        );
        assert_eq!(ObjectType::Device.device_field(), None);
    }
}
