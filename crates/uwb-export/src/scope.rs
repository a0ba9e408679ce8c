//! Export scope resolution.
//!
//! An `(environment name, time range)` scope resolves to the tag devices
//! assigned there during the range, their assignment ids, the range's
//! coordinate space, and the datapoints recorded against those assignments.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uwb_common::config::ResolverConfig;
use uwb_common::{AssignmentId, CoordinateSpaceId, DatapointId, DeviceId, SerialNumber, TimeWindow};
use uwb_core::resolve::Environment;
use uwb_core::service::{field_str, field_time};
use uwb_core::{
    AssignmentLookup, CoordinateSpaceResolver, Filter, IdentityResolver, ObjectType, QueryService,
};

use crate::error::ExportError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportScope {
    pub environment_name: String,
    pub window: TimeWindow,
}

impl ExportScope {
    pub fn new(environment_name: impl Into<String>, window: TimeWindow) -> Self {
        ExportScope {
            environment_name: environment_name.into(),
            window,
        }
    }
}

/// Everything needed to export a scope, fetched once up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedScope {
    pub environment: Environment,
    /// Serial number to device id, tags only.
    pub devices: BTreeMap<SerialNumber, DeviceId>,
    pub assignment_ids: Vec<AssignmentId>,
    /// `None` only when the scope has no tag devices.
    pub coordinate_space: Option<CoordinateSpaceId>,
    /// Datapoints in the range, ordered by timestamp then id.
    pub datapoints: Vec<(DatapointId, DateTime<Utc>)>,
}

impl ResolvedScope {
    fn empty(environment: Environment) -> Self {
        ResolvedScope {
            environment,
            devices: BTreeMap::new(),
            assignment_ids: Vec::new(),
            coordinate_space: None,
            datapoints: Vec::new(),
        }
    }
}

/// Resolve `scope`; a scope with nothing in it resolves to an empty result.
pub fn resolve_scope(
    service: &dyn QueryService,
    scope: &ExportScope,
    resolver: &ResolverConfig,
    chunk_size: usize,
) -> Result<ResolvedScope, ExportError> {
    let lookup = AssignmentLookup::new(service, chunk_size);
    let environment = lookup.environment_by_name(&scope.environment_name)?;
    let assignments = lookup.for_environment(&environment.environment_id, &scope.window)?;
    if assignments.is_empty() {
        info!(
            environment = %environment.name,
            window = %scope.window,
            "No assignments in export scope"
        );
        return Ok(ResolvedScope::empty(environment));
    }

    let assigned: BTreeSet<&DeviceId> = assignments.iter().map(|a| &a.device_id).collect();
    let devices: BTreeMap<SerialNumber, DeviceId> = IdentityResolver::new(service, resolver)
        .tag_devices(assigned.iter().copied())?
        .into_iter()
        .map(|(device, serial)| (serial, device))
        .collect();
    let tag_ids: BTreeSet<&DeviceId> = devices.values().collect();
    let assignment_ids: Vec<AssignmentId> = assignments
        .iter()
        .filter(|a| tag_ids.contains(&a.device_id))
        .map(|a| a.assignment_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if assignment_ids.is_empty() {
        return Ok(ResolvedScope::empty(environment));
    }

    let device_list: Vec<DeviceId> = tag_ids.into_iter().cloned().collect();
    let space = CoordinateSpaceResolver::new(service, chunk_size).resolve(&device_list, &scope.window)?;
    let datapoints = list_datapoints(service, &assignment_ids, &scope.window, chunk_size)?;

    info!(
        environment = %environment.name,
        devices = devices.len(),
        assignments = assignment_ids.len(),
        datapoints = datapoints.len(),
        coordinate_space = %space.space_id,
        "Resolved export scope"
    );
    Ok(ResolvedScope {
        environment,
        devices,
        assignment_ids,
        coordinate_space: Some(space.space_id),
        datapoints,
    })
}

/// Datapoints with `window.start <= timestamp <= window.end` recorded
/// against any of `assignment_ids`.
pub fn list_datapoints(
    service: &dyn QueryService,
    assignment_ids: &[AssignmentId],
    window: &TimeWindow,
    chunk_size: usize,
) -> Result<Vec<(DatapointId, DateTime<Utc>)>, ExportError> {
    if assignment_ids.is_empty() {
        return Ok(Vec::new());
    }
    let filter = Filter::and(vec![
        Filter::gte("timestamp", window.start.to_rfc3339()),
        Filter::lte("timestamp", window.end.to_rfc3339()),
        Filter::is_in("source", assignment_ids.iter().map(AssignmentId::as_str)),
    ]);
    let records = service.search(
        ObjectType::Datapoint,
        &filter,
        &["data_id", "timestamp"],
        chunk_size,
    )?;
    let mut datapoints = Vec::with_capacity(records.len());
    for record in &records {
        let id = DatapointId::from(field_str(record, ObjectType::Datapoint, "data_id")?);
        let timestamp = field_time(record, ObjectType::Datapoint, "timestamp")?.ok_or_else(|| {
            ExportError::MalformedDatapoint {
                datapoint_id: id.to_string(),
                message: "missing timestamp".to_string(),
            }
        })?;
        datapoints.push((id, timestamp));
    }
    datapoints.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    Ok(datapoints)
}
