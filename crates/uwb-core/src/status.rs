//! Per-device, per-type "last seen" status for a fleet of tags.
//!
//! Issues one latest-record query per device and data type. A device with
//! no records of a type gets an empty entry for it, never an error.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uwb_common::config::ResolverConfig;
use uwb_common::{DataType, DeviceId, SerialNumber, TimeWindow};

use crate::logging::event_names;
use crate::resolve::{AssignmentLookup, IdentityResolver, ResolveError};
use crate::service::{field_time, Filter, ObjectType, QueryService, ServiceError};

/// Last-seen state of one modality on one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityStatus {
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub minutes_ago: Option<f64>,
}

impl ModalityStatus {
    fn observed(latest: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        ModalityStatus {
            latest_timestamp: Some(latest),
            minutes_ago: Some(minutes_elapsed(latest, now)),
        }
    }
}

/// Minutes from `then` to `now`, fractional; negative if `then` is ahead.
pub fn minutes_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 60_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRow {
    pub device_id: DeviceId,
    pub serial_number: Option<SerialNumber>,
    pub modalities: BTreeMap<DataType, ModalityStatus>,
}

impl StatusRow {
    /// Status of one modality; empty when nothing was ever recorded.
    pub fn get(&self, data_type: DataType) -> ModalityStatus {
        self.modalities.get(&data_type).copied().unwrap_or_default()
    }
}

/// Status table keyed by device, ordered by device id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTable {
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<StatusRow>,
}

impl StatusTable {
    pub fn row(&self, device_id: &DeviceId) -> Option<&StatusRow> {
        self.rows.iter().find(|r| &r.device_id == device_id)
    }

    /// One flat object per device with `<type>_latest_timestamp` and
    /// `<type>_minutes_ago` columns (`null` when never seen).
    pub fn to_flat_json(&self) -> Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = Map::new();
                out.insert("device_id".into(), Value::from(row.device_id.as_str()));
                out.insert(
                    "serial_number".into(),
                    row.serial_number
                        .as_ref()
                        .map_or(Value::Null, |s| Value::from(s.as_str())),
                );
                for data_type in DataType::PROCESSING_ORDER {
                    let status = row.get(data_type);
                    out.insert(
                        format!("{}_latest_timestamp", data_type),
                        status
                            .latest_timestamp
                            .map_or(Value::Null, |ts| Value::from(ts.to_rfc3339())),
                    );
                    out.insert(
                        format!("{}_minutes_ago", data_type),
                        status.minutes_ago.map_or(Value::Null, Value::from),
                    );
                }
                Value::Object(out)
            })
            .collect();
        Value::Array(rows)
    }
}

pub struct StatusAggregator<'a> {
    service: &'a dyn QueryService,
    resolver: ResolverConfig,
}

impl<'a> StatusAggregator<'a> {
    pub fn new(service: &'a dyn QueryService, resolver: &ResolverConfig) -> Self {
        StatusAggregator {
            service,
            resolver: resolver.clone(),
        }
    }

    /// Status of `devices` as of the current time.
    pub fn status(&self, devices: &[DeviceId]) -> Result<StatusTable, ServiceError> {
        self.status_at(devices, Utc::now())
    }

    /// Status of `devices` with elapsed minutes measured against `now`.
    pub fn status_at(
        &self,
        devices: &[DeviceId],
        now: DateTime<Utc>,
    ) -> Result<StatusTable, ServiceError> {
        let devices: BTreeSet<&DeviceId> = devices.iter().collect();
        let serials = IdentityResolver::new(self.service, &self.resolver)
            .tag_devices(devices.iter().copied())?;

        let mut rows = Vec::with_capacity(devices.len());
        for device in devices {
            let mut modalities = BTreeMap::new();
            for data_type in DataType::PROCESSING_ORDER {
                if let Some(latest) = self.latest(data_type, device)? {
                    modalities.insert(data_type, ModalityStatus::observed(latest, now));
                }
            }
            rows.push(StatusRow {
                device_id: device.clone(),
                serial_number: serials.get(device).cloned(),
                modalities,
            });
        }

        info!(
            target: event_names::STATUS_QUERIED,
            devices = rows.len(),
            "Built fleet status table"
        );
        Ok(StatusTable {
            generated_at: now,
            rows,
        })
    }

    /// Status of every tag assigned to the named environment at `now`.
    /// Assigned devices of other types are not reported.
    pub fn environment_status_at(
        &self,
        environment_name: &str,
        now: DateTime<Utc>,
    ) -> Result<StatusTable, ResolveError> {
        let lookup = AssignmentLookup::new(self.service, self.resolver.chunk_size);
        let environment = lookup.environment_by_name(environment_name)?;
        let instant = TimeWindow { start: now, end: now };
        let assigned: BTreeSet<DeviceId> = lookup
            .for_environment(&environment.environment_id, &instant)?
            .into_iter()
            .map(|a| a.device_id)
            .collect();
        let tags = IdentityResolver::new(self.service, &self.resolver).tag_devices(&assigned)?;
        let devices: Vec<DeviceId> = tags.into_keys().collect();
        Ok(self.status_at(&devices, now)?)
    }

    fn latest(
        &self,
        data_type: DataType,
        device: &DeviceId,
    ) -> Result<Option<DateTime<Utc>>, ServiceError> {
        let object_type = ObjectType::for_data_type(data_type);
        let Some(device_field) = object_type.device_field() else {
            return Ok(None);
        };
        let record = self.service.fetch_latest(
            object_type,
            &Filter::eq(device_field, device.as_str()),
            "timestamp",
        )?;
        match record {
            Some(record) => field_time(&record, object_type, "timestamp"),
            None => Ok(None),
        }
    }
}
