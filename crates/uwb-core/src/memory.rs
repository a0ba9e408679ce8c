//! In-memory query service and datapoint store for testing.
//!
//! Evaluates [`Filter`]s directly against stored records, and supports
//! failure injection for exercising the compensation path:
//!
//! ```ignore
//! use uwb_core::memory::MemoryService;
//! use uwb_core::ObjectType;
//!
//! let service = MemoryService::new();
//! service.insert_device("D1", "S1", "UWBTAG");
//! // first gyroscope create call succeeds, every later one fails
//! service.fail_create_after(ObjectType::Gyroscope, 1);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uwb_common::{DatapointId, RecordId};

use crate::service::{
    compare_values, Datapoint, DatapointStore, DeleteStatus, Filter, ObjectType, QueryService,
    Record, ServiceError,
};

/// Kinds of calls counted by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Search,
    FetchLatest,
    Create,
    Delete,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<ObjectType, BTreeMap<String, Record>>,
    datapoints: HashMap<DatapointId, Datapoint>,
    next_id: u64,
    calls: HashMap<(ObjectType, CallKind), usize>,
    creates_allowed: HashMap<ObjectType, usize>,
    fail_deletes: bool,
    failing_datapoints: HashSet<DatapointId>,
}

/// Thread-safe in-memory implementation of both service contracts.
#[derive(Debug, Default)]
pub struct MemoryService {
    state: Mutex<State>,
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a record, using its id field when present.
    pub fn insert(&self, object_type: ObjectType, mut record: Record) -> RecordId {
        let mut state = self.lock();
        let id = match record.get(object_type.id_field()).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                let id = format!("{}-{}", object_type.as_str(), state.next_id);
                record.insert(object_type.id_field().to_string(), Value::from(id.clone()));
                id
            }
        };
        state
            .tables
            .entry(object_type)
            .or_default()
            .insert(id.clone(), record);
        RecordId::new(id)
    }

    pub fn insert_device(&self, device_id: &str, serial_number: &str, device_type: &str) {
        self.insert(
            ObjectType::Device,
            object(json!({
                "device_id": device_id,
                "serial_number": serial_number,
                "device_type": device_type,
                "name": format!("tag-{}", serial_number),
            })),
        );
    }

    pub fn insert_environment(&self, environment_id: &str, name: &str) {
        self.insert(
            ObjectType::Environment,
            object(json!({"environment_id": environment_id, "name": name})),
        );
    }

    pub fn insert_assignment(
        &self,
        assignment_id: &str,
        device_id: &str,
        environment_id: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) {
        self.insert(
            ObjectType::Assignment,
            object(json!({
                "assignment_id": assignment_id,
                "device": device_id,
                "environment": environment_id,
                "start": start.to_rfc3339(),
                "end": end.map(|e| e.to_rfc3339()),
            })),
        );
    }

    pub fn insert_coordinate_space(
        &self,
        space_id: &str,
        name: &str,
        environment_id: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) {
        self.insert(
            ObjectType::CoordinateSpace,
            object(json!({
                "space_id": space_id,
                "name": name,
                "environment": environment_id,
                "start": start.to_rfc3339(),
                "end": end.map(|e| e.to_rfc3339()),
            })),
        );
    }

    /// Store a datapoint both as a searchable record and as a raw blob.
    pub fn insert_datapoint(&self, datapoint: Datapoint) {
        self.insert(
            ObjectType::Datapoint,
            object(json!({
                "data_id": datapoint.id.as_str(),
                "timestamp": datapoint.timestamp.to_rfc3339(),
                "source": datapoint.source_assignment_id.as_str(),
            })),
        );
        self.lock()
            .datapoints
            .insert(datapoint.id.clone(), datapoint);
    }

    /// Snapshot of every record of a type, ordered by id.
    pub fn records(&self, object_type: ObjectType) -> Vec<Record> {
        self.lock()
            .tables
            .get(&object_type)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, object_type: ObjectType) -> usize {
        self.lock().tables.get(&object_type).map_or(0, BTreeMap::len)
    }

    pub fn contains(&self, object_type: ObjectType, id: &RecordId) -> bool {
        self.lock()
            .tables
            .get(&object_type)
            .is_some_and(|t| t.contains_key(id.as_str()))
    }

    /// Number of calls of `kind` made against `object_type`.
    pub fn calls(&self, object_type: ObjectType, kind: CallKind) -> usize {
        self.lock()
            .calls
            .get(&(object_type, kind))
            .copied()
            .unwrap_or(0)
    }

    /// Allow `successes` more create calls for `object_type`, then fail.
    pub fn fail_create_after(&self, object_type: ObjectType, successes: usize) {
        self.lock().creates_allowed.insert(object_type, successes);
    }

    /// Make every delete call fail at the transport level.
    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Make fetching one datapoint fail.
    pub fn fail_datapoint(&self, id: &DatapointId) {
        self.lock().failing_datapoints.insert(id.clone());
    }

    fn count_call(state: &mut State, object_type: ObjectType, kind: CallKind) {
        *state.calls.entry((object_type, kind)).or_insert(0) += 1;
    }
}

fn project(record: &Record, fields: &[&str]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }
    fields
        .iter()
        .filter_map(|f| record.get(*f).map(|v| (f.to_string(), v.clone())))
        .collect()
}

impl QueryService for MemoryService {
    fn search(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        return_fields: &[&str],
        chunk_size: usize,
    ) -> Result<Vec<Record>, ServiceError> {
        if chunk_size == 0 {
            return Err(ServiceError::Rejected {
                object_type,
                message: "chunk size must be positive".to_string(),
            });
        }
        let mut state = self.lock();
        Self::count_call(&mut state, object_type, CallKind::Search);
        Ok(state
            .tables
            .get(&object_type)
            .map(|table| {
                table
                    .values()
                    .filter(|r| filter.matches(r))
                    .map(|r| project(r, return_fields))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_latest(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        timestamp_field: &str,
    ) -> Result<Option<Record>, ServiceError> {
        let mut state = self.lock();
        Self::count_call(&mut state, object_type, CallKind::FetchLatest);
        let Some(table) = state.tables.get(&object_type) else {
            return Ok(None);
        };
        let latest = table
            .values()
            .filter(|r| filter.matches(r))
            .filter(|r| r.get(timestamp_field).is_some_and(Value::is_string))
            .max_by(|a, b| {
                compare_values(&a[timestamp_field], &b[timestamp_field])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();
        Ok(latest)
    }

    fn create(
        &self,
        object_type: ObjectType,
        records: &[Record],
    ) -> Result<Vec<RecordId>, ServiceError> {
        {
            let mut state = self.lock();
            Self::count_call(&mut state, object_type, CallKind::Create);
            if let Some(remaining) = state.creates_allowed.get_mut(&object_type) {
                if *remaining == 0 {
                    return Err(ServiceError::Transport(format!(
                        "injected create failure for {}",
                        object_type
                    )));
                }
                *remaining -= 1;
            }
        }
        Ok(records
            .iter()
            .map(|r| {
                let mut record = r.clone();
                record.remove(object_type.id_field());
                self.insert(object_type, record)
            })
            .collect())
    }

    fn delete(
        &self,
        object_type: ObjectType,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteStatus>, ServiceError> {
        let mut state = self.lock();
        Self::count_call(&mut state, object_type, CallKind::Delete);
        if state.fail_deletes {
            return Err(ServiceError::Transport(format!(
                "injected delete failure for {}",
                object_type
            )));
        }
        let table = state.tables.entry(object_type).or_default();
        Ok(ids
            .iter()
            .map(|id| match table.remove(id.as_str()) {
                Some(_) => DeleteStatus::Deleted,
                None => DeleteStatus::NotFound,
            })
            .collect())
    }
}

impl DatapointStore for MemoryService {
    fn get_datapoint(&self, id: &DatapointId) -> Result<Datapoint, ServiceError> {
        let state = self.lock();
        if state.failing_datapoints.contains(id) {
            return Err(ServiceError::Transport(format!(
                "injected fetch failure for datapoint {}",
                id
            )));
        }
        state
            .datapoints
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                object_type: ObjectType::Datapoint,
                id: id.to_string(),
            })
    }
}
