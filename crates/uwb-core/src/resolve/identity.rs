//! Serial-number to device-identity resolution.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uwb_common::config::ResolverConfig;
use uwb_common::{DeviceId, SerialNumber};

use crate::logging::event_names;
use crate::service::{field_str, Filter, ObjectType, QueryService, ServiceError};

/// A device as known to the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub serial_number: SerialNumber,
    pub device_type: String,
}

/// Maps raw serial numbers to device identities of the accepted types.
pub struct IdentityResolver<'a> {
    service: &'a dyn QueryService,
    device_types: Vec<String>,
    chunk_size: usize,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(service: &'a dyn QueryService, config: &ResolverConfig) -> Self {
        IdentityResolver {
            service,
            device_types: config.device_types.clone(),
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Resolve every serial that maps to exactly one device.
    ///
    /// The output never has more entries than distinct inputs. Serials with
    /// no device, or with more than one, are logged and omitted. Empty input
    /// returns an empty map without querying.
    pub fn resolve<'s, I>(
        &self,
        serials: I,
    ) -> Result<BTreeMap<SerialNumber, DeviceIdentity>, ServiceError>
    where
        I: IntoIterator<Item = &'s SerialNumber>,
    {
        let wanted: BTreeSet<&SerialNumber> = serials.into_iter().collect();
        if wanted.is_empty() {
            debug!(target: event_names::RESOLVE_IDENTITIES, "No serial numbers to resolve");
            return Ok(BTreeMap::new());
        }

        let wanted: Vec<&SerialNumber> = wanted.into_iter().collect();
        let mut found: BTreeMap<SerialNumber, Vec<DeviceIdentity>> = BTreeMap::new();
        for chunk in wanted.chunks(self.chunk_size) {
            let filter = Filter::and(vec![
                Filter::is_in("device_type", self.device_types.iter().map(String::as_str)),
                Filter::is_in("serial_number", chunk.iter().map(|s| s.as_str())),
            ]);
            let records = self.service.search(
                ObjectType::Device,
                &filter,
                &["device_id", "serial_number", "device_type"],
                self.chunk_size,
            )?;
            for record in &records {
                let identity = DeviceIdentity {
                    device_id: field_str(record, ObjectType::Device, "device_id")?.into(),
                    serial_number: field_str(record, ObjectType::Device, "serial_number")?.into(),
                    device_type: field_str(record, ObjectType::Device, "device_type")?
                        .to_string(),
                };
                found
                    .entry(identity.serial_number.clone())
                    .or_default()
                    .push(identity);
            }
        }

        let mut resolved = BTreeMap::new();
        for serial in wanted {
            match found.remove(serial) {
                Some(mut matches) if matches.len() == 1 => {
                    if let Some(identity) = matches.pop() {
                        resolved.insert(serial.clone(), identity);
                    }
                }
                Some(matches) => warn!(
                    target: event_names::RESOLVE_UNRESOLVED,
                    serial_number = %serial,
                    devices = matches.len(),
                    "Serial number matches more than one device; dropping its records"
                ),
                None => warn!(
                    target: event_names::RESOLVE_UNRESOLVED,
                    serial_number = %serial,
                    "Serial number did not resolve to a device; dropping its records"
                ),
            }
        }

        debug!(
            target: event_names::RESOLVE_IDENTITIES,
            resolved = resolved.len(),
            device_types = ?self.device_types,
            "Resolved serial numbers"
        );
        Ok(resolved)
    }

    /// Device id to serial number for those of `devices` whose type is
    /// accepted. Devices of any other type, or unknown ids, are absent.
    pub fn tag_devices<'d, I>(
        &self,
        devices: I,
    ) -> Result<BTreeMap<DeviceId, SerialNumber>, ServiceError>
    where
        I: IntoIterator<Item = &'d DeviceId>,
    {
        let wanted: BTreeSet<&DeviceId> = devices.into_iter().collect();
        let wanted: Vec<&DeviceId> = wanted.into_iter().collect();
        let mut tags = BTreeMap::new();
        for chunk in wanted.chunks(self.chunk_size) {
            let filter = Filter::and(vec![
                Filter::is_in("device_id", chunk.iter().map(|d| d.as_str())),
                Filter::is_in("device_type", self.device_types.iter().map(String::as_str)),
            ]);
            let records = self.service.search(
                ObjectType::Device,
                &filter,
                &["device_id", "serial_number"],
                self.chunk_size,
            )?;
            for record in &records {
                tags.insert(
                    DeviceId::from(field_str(record, ObjectType::Device, "device_id")?),
                    SerialNumber::from(field_str(record, ObjectType::Device, "serial_number")?),
                );
            }
        }
        Ok(tags)
    }
}
