//! Timed device-to-environment assignments and environment lookup.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uwb_common::{AssignmentId, DeviceId, EnvironmentId, TimeWindow};

use super::{overlap_filter, ResolveError};
use crate::service::{
    field_str, field_time, Filter, ObjectType, QueryService, Record, ServiceError,
};

/// A device assigned to an environment for `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: AssignmentId,
    pub device_id: DeviceId,
    pub environment_id: EnvironmentId,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Assignment {
    fn from_record(record: &Record) -> Result<Self, ServiceError> {
        let ot = ObjectType::Assignment;
        let start = field_time(record, ot, "start")?.ok_or_else(|| {
            ServiceError::MalformedRecord {
                object_type: ot,
                message: "assignment has no start".to_string(),
            }
        })?;
        Ok(Assignment {
            assignment_id: field_str(record, ot, "assignment_id")?.into(),
            device_id: field_str(record, ot, "device")?.into(),
            environment_id: field_str(record, ot, "environment")?.into(),
            start,
            end: field_time(record, ot, "end")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub environment_id: EnvironmentId,
    pub name: String,
}

/// Read-only queries over assignments and environments.
pub struct AssignmentLookup<'a> {
    service: &'a dyn QueryService,
    chunk_size: usize,
}

const ASSIGNMENT_FIELDS: &[&str] = &["assignment_id", "device", "environment", "start", "end"];

impl<'a> AssignmentLookup<'a> {
    pub fn new(service: &'a dyn QueryService, chunk_size: usize) -> Self {
        AssignmentLookup {
            service,
            chunk_size: chunk_size.max(1),
        }
    }

    fn search(&self, filter: Filter) -> Result<Vec<Assignment>, ServiceError> {
        self.service
            .search(ObjectType::Assignment, &filter, ASSIGNMENT_FIELDS, self.chunk_size)?
            .iter()
            .map(Assignment::from_record)
            .collect()
    }

    /// Assignments of any of `devices` overlapping `window`.
    pub fn for_devices(
        &self,
        devices: &[DeviceId],
        window: &TimeWindow,
    ) -> Result<Vec<Assignment>, ServiceError> {
        if devices.is_empty() {
            return Ok(Vec::new());
        }
        self.search(Filter::and(vec![
            Filter::is_in("device", devices.iter().map(DeviceId::as_str)),
            overlap_filter(window),
        ]))
    }

    /// Assignments into `environment` overlapping `window`.
    pub fn for_environment(
        &self,
        environment: &EnvironmentId,
        window: &TimeWindow,
    ) -> Result<Vec<Assignment>, ServiceError> {
        self.search(Filter::and(vec![
            Filter::eq("environment", environment.as_str()),
            overlap_filter(window),
        ]))
    }

    /// Environments for a set of ids, ordered by id.
    pub fn environments(
        &self,
        ids: &BTreeSet<EnvironmentId>,
    ) -> Result<Vec<Environment>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.service.search(
            ObjectType::Environment,
            &Filter::is_in("environment_id", ids.iter().map(EnvironmentId::as_str)),
            &["environment_id", "name"],
            self.chunk_size,
        )?;
        let mut environments = records
            .iter()
            .map(environment_from_record)
            .collect::<Result<Vec<_>, _>>()?;
        environments.sort_by(|a, b| a.environment_id.cmp(&b.environment_id));
        Ok(environments)
    }

    /// The single environment called `name`.
    pub fn environment_by_name(&self, name: &str) -> Result<Environment, ResolveError> {
        let records = self.service.search(
            ObjectType::Environment,
            &Filter::eq("name", name),
            &["environment_id", "name"],
            self.chunk_size,
        )?;
        let mut environments = records
            .iter()
            .map(environment_from_record)
            .collect::<Result<Vec<_>, _>>()?;
        match environments.len() {
            0 => Err(ResolveError::UnknownEnvironment {
                name: name.to_string(),
            }),
            1 => Ok(environments.remove(0)),
            _ => Err(ResolveError::AmbiguousEnvironment {
                candidates: environments
                    .into_iter()
                    .map(|e| format!("{} ({})", e.name, e.environment_id))
                    .collect(),
            }),
        }
    }
}

fn environment_from_record(record: &Record) -> Result<Environment, ServiceError> {
    Ok(Environment {
        environment_id: field_str(record, ObjectType::Environment, "environment_id")?.into(),
        name: field_str(record, ObjectType::Environment, "name")?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_for_devices_applies_overlap_rule() {
        let service = MemoryService::new();
        service.insert_assignment("A1", "D1", "E1", at(1), None);
        service.insert_assignment("A2", "D1", "E2", at(1), Some(at(2)));
        service.insert_assignment("A3", "D2", "E1", at(1), None);
        let lookup = AssignmentLookup::new(&service, 100);
        let window = TimeWindow::new(at(5), at(6)).unwrap();

        let found = lookup.for_devices(&[DeviceId::from("D1")], &window).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].assignment_id.as_str(), "A1");
        assert_eq!(found[0].end, None);

        let in_env = lookup.for_environment(&EnvironmentId::from("E1"), &window).unwrap();
        assert_eq!(in_env.len(), 2);
    }

    #[test]
    fn test_environment_by_name() {
        let service = MemoryService::new();
        service.insert_environment("E1", "classroom");
        service.insert_environment("E2", "lab");
        service.insert_environment("E3", "lab");
        let lookup = AssignmentLookup::new(&service, 100);

        assert_eq!(
            lookup.environment_by_name("classroom").unwrap().environment_id.as_str(),
            "E1"
        );
        assert!(matches!(
            lookup.environment_by_name("gym"),
            Err(ResolveError::UnknownEnvironment { .. })
        ));
        assert!(matches!(
            lookup.environment_by_name("lab"),
            Err(ResolveError::AmbiguousEnvironment { .. })
        ));
    }
}
