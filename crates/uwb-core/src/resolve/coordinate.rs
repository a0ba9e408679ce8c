//! Coordinate-space resolution for a device set and time window.
//!
//! Two uniqueness checks, both using the assignment overlap rule:
//! 1. the devices' overlapping assignments must name exactly one environment
//! 2. that environment must have exactly one overlapping coordinate space

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;
use uwb_common::{CoordinateSpaceId, DeviceId, EnvironmentId, TimeWindow};

use super::assignment::AssignmentLookup;
use super::{overlap_filter, ResolveError};
use crate::logging::event_names;
use crate::service::{field_str, Filter, ObjectType, QueryService};

/// The unique coordinate space for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSpace {
    pub environment_id: EnvironmentId,
    pub environment_name: String,
    pub space_id: CoordinateSpaceId,
    pub space_name: String,
}

pub struct CoordinateSpaceResolver<'a> {
    service: &'a dyn QueryService,
    chunk_size: usize,
}

impl<'a> CoordinateSpaceResolver<'a> {
    pub fn new(service: &'a dyn QueryService, chunk_size: usize) -> Self {
        CoordinateSpaceResolver {
            service,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn resolve(
        &self,
        devices: &[DeviceId],
        window: &TimeWindow,
    ) -> Result<ResolvedSpace, ResolveError> {
        let lookup = AssignmentLookup::new(self.service, self.chunk_size);
        let environment_ids: BTreeSet<EnvironmentId> = lookup
            .for_devices(devices, window)?
            .into_iter()
            .map(|a| a.environment_id)
            .collect();

        if environment_ids.is_empty() {
            return Err(ResolveError::NoEnvironment { window: *window });
        }

        let environments = lookup.environments(&environment_ids)?;
        let mut names: BTreeMap<EnvironmentId, String> = environments
            .into_iter()
            .map(|e| (e.environment_id, e.name))
            .collect();

        if environment_ids.len() > 1 {
            let candidates = environment_ids
                .iter()
                .map(|id| names.get(id).cloned().unwrap_or_else(|| id.to_string()))
                .collect();
            return Err(ResolveError::AmbiguousEnvironment { candidates });
        }

        let Some(environment_id) = environment_ids.into_iter().next() else {
            return Err(ResolveError::NoEnvironment { window: *window });
        };
        let environment_name = names
            .remove(&environment_id)
            .unwrap_or_else(|| environment_id.to_string());

        let filter = Filter::and(vec![
            Filter::eq("environment", environment_id.as_str()),
            overlap_filter(window),
        ]);
        let records = self.service.search(
            ObjectType::CoordinateSpace,
            &filter,
            &["space_id", "name"],
            self.chunk_size,
        )?;
        let mut spaces: BTreeMap<String, String> = BTreeMap::new();
        for record in &records {
            let id = field_str(record, ObjectType::CoordinateSpace, "space_id")?;
            let name = record
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(id);
            spaces.insert(id.to_string(), name.to_string());
        }

        match spaces.len() {
            0 => Err(ResolveError::NoCoordinateSpace {
                environment: environment_name,
            }),
            1 => {
                let Some((space_id, space_name)) = spaces.into_iter().next() else {
                    return Err(ResolveError::NoCoordinateSpace {
                        environment: environment_name,
                    });
                };
                info!(
                    target: event_names::RESOLVE_SPACE,
                    environment = %environment_name,
                    coordinate_space = %space_name,
                    window = %window,
                    "Resolved unique coordinate space"
                );
                Ok(ResolvedSpace {
                    environment_id,
                    environment_name,
                    space_id: CoordinateSpaceId::new(space_id),
                    space_name,
                })
            }
            _ => Err(ResolveError::AmbiguousCoordinateSpace {
                environment: environment_name,
                candidates: spaces.into_values().collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::new(at(10), at(11)).unwrap()
    }

    fn seeded() -> MemoryService {
        let service = MemoryService::new();
        service.insert_environment("E1", "classroom");
        service.insert_environment("E2", "library");
        service.insert_assignment("A1", "D1", "E1", at(1), None);
        service.insert_coordinate_space("SPACE-1", "classroom-2024", "E1", at(1), None);
        service.insert_coordinate_space("SPACE-0", "classroom-2023", "E1", at(1), Some(at(5)));
        service
    }

    #[test]
    fn test_unique_space() {
        let service = seeded();
        let resolver = CoordinateSpaceResolver::new(&service, 100);
        let space = resolver.resolve(&[DeviceId::from("D1")], &window()).unwrap();
        assert_eq!(space.space_id.as_str(), "SPACE-1");
        assert_eq!(space.environment_name, "classroom");
    }

    #[test]
    fn test_no_environment() {
        let service = seeded();
        let resolver = CoordinateSpaceResolver::new(&service, 100);
        let err = resolver.resolve(&[DeviceId::from("D7")], &window()).unwrap_err();
        assert_eq!(err, ResolveError::NoEnvironment { window: window() });
    }

    #[test]
    fn test_ambiguous_environment_lists_names() {
        let service = seeded();
        service.insert_assignment("A2", "D2", "E2", at(1), None);
        let resolver = CoordinateSpaceResolver::new(&service, 100);
        let err = resolver
            .resolve(&[DeviceId::from("D1"), DeviceId::from("D2")], &window())
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::AmbiguousEnvironment {
                candidates: vec!["classroom".into(), "library".into()]
            }
        );
    }

    #[test]
    fn test_no_and_ambiguous_space() {
        let service = seeded();
        service.insert_assignment("A2", "D2", "E2", at(20), None);
        let resolver = CoordinateSpaceResolver::new(&service, 100);
        let late = TimeWindow::new(at(21), at(22)).unwrap();
        assert!(matches!(
            resolver.resolve(&[DeviceId::from("D2")], &late),
            Err(ResolveError::NoCoordinateSpace { .. })
        ));

        service.insert_coordinate_space("SPACE-2", "classroom-alt", "E1", at(8), None);
        let err = resolver.resolve(&[DeviceId::from("D1")], &window()).unwrap_err();
        match err {
            ResolveError::AmbiguousCoordinateSpace {
                environment,
                candidates,
            } => {
                assert_eq!(environment, "classroom");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
