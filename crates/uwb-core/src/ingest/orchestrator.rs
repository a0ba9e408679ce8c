//! Resolve, decode and write raw wire records with all-or-nothing semantics.
//!
//! For each data type in [`DataType::PROCESSING_ORDER`]:
//! 1. resolve serial numbers to devices (unresolved records are dropped)
//! 2. decode (undecodable records are skipped and counted)
//! 3. for positions, resolve the call's unique coordinate space
//! 4. write in chunks, recording every created id in the call's [`Saga`]
//!
//! Any failure after the first write rolls back every id the call created
//! before the error is returned.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uwb_common::config::{validate_config, PipelineConfig};
use uwb_common::{CoordinateSpaceId, DataType, DeviceId, RecordId, SerialNumber, TimeWindow};
use uwb_wire::{
    parse_jsonl, Decoder, RawBatches, RawObservation, Reading, ScaleTable,
};

use super::observation::DecodedObservation;
use super::saga::{RollbackError, Saga};
use crate::logging::{event_names, generate_call_id};
use crate::resolve::{
    CoordinateSpaceResolver, DeviceIdentity, IdentityResolver, ResolveError, ResolvedSpace,
};
use crate::service::{ObjectType, QueryService, Record, ServiceError};

/// Failure of a whole ingestion call.
///
/// `Resolve` and `Write` are only returned after rollback completed, so the
/// call can be replayed without duplicating records. `RollbackFailed` must
/// never be retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("{data_type} resolution failed ({rolled_back} records rolled back): {source}")]
    Resolve {
        data_type: DataType,
        #[source]
        source: ResolveError,
        rolled_back: usize,
    },

    #[error("{data_type} write failed ({rolled_back} records rolled back): {source}")]
    Write {
        data_type: DataType,
        #[source]
        source: ServiceError,
        rolled_back: usize,
    },

    #[error("{data_type} failed ({cause}) and {source}")]
    RollbackFailed {
        data_type: DataType,
        cause: String,
        #[source]
        source: RollbackError,
    },
}

impl IngestError {
    pub fn data_type(&self) -> DataType {
        match self {
            IngestError::Resolve { data_type, .. }
            | IngestError::Write { data_type, .. }
            | IngestError::RollbackFailed { data_type, .. } => *data_type,
        }
    }

    /// Whether the caller may replay the whole call.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Write { .. } => true,
            IngestError::Resolve { source, .. } => matches!(source, ResolveError::Service(_)),
            IngestError::RollbackFailed { .. } => false,
        }
    }

    /// Record ids that still exist after a failed rollback.
    pub fn remaining_ids(&self) -> Vec<(ObjectType, RecordId)> {
        match self {
            IngestError::RollbackFailed { source, .. } => source
                .remaining
                .iter()
                .flat_map(|b| b.ids.iter().map(move |id| (b.object_type, id.clone())))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<IngestError> for uwb_common::Error {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Resolve { source, .. } => source.into(),
            IngestError::Write {
                data_type,
                source,
                rolled_back,
            } => uwb_common::Error::Write {
                data_type: data_type.to_string(),
                message: source.to_string(),
                rolled_back,
            },
            IngestError::RollbackFailed { cause, source, .. } => {
                uwb_common::Error::RollbackFailed {
                    remaining: source.remaining_count(),
                    message: format!("{}; {}", cause, source.message),
                }
            }
        }
    }
}

/// Per-type outcome of an ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeReport {
    pub data_type: DataType,
    /// Raw records supplied.
    pub raw: usize,
    /// Records dropped because their serial did not resolve.
    pub unresolved: usize,
    /// Records skipped because they failed to decode.
    pub skipped: usize,
    /// Ids created for this type, in write order.
    pub ids: Vec<RecordId>,
}

impl TypeReport {
    fn empty(data_type: DataType, raw: usize) -> Self {
        TypeReport {
            data_type,
            raw,
            unresolved: 0,
            skipped: 0,
            ids: Vec::new(),
        }
    }

    pub fn written(&self) -> usize {
        self.ids.len()
    }
}

/// Outcome of a successful ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub call_id: String,
    pub types: Vec<TypeReport>,
    /// Space attached to position records, when any were written.
    pub coordinate_space: Option<ResolvedSpace>,
    /// Lines of a JSONL blob that could not be parsed.
    pub malformed_lines: usize,
    /// Well-formed records of types the pipeline does not ingest.
    pub unsupported: usize,
}

impl IngestReport {
    pub fn total_written(&self) -> usize {
        self.types.iter().map(TypeReport::written).sum()
    }

    pub fn get(&self, data_type: DataType) -> Option<&TypeReport> {
        self.types.iter().find(|t| t.data_type == data_type)
    }
}

/// Coordinates one ingestion call against a query service.
pub struct Orchestrator<'a> {
    service: &'a dyn QueryService,
    config: PipelineConfig,
    scales: ScaleTable,
    coordinate_space: Option<CoordinateSpaceId>,
}

impl<'a> Orchestrator<'a> {
    /// Fails with a config error when `config` does not validate.
    pub fn new(
        service: &'a dyn QueryService,
        config: PipelineConfig,
    ) -> Result<Self, uwb_common::Error> {
        validate_config(&config)?;
        let scales = ScaleTable::from_config(&config.decode)?;
        Ok(Orchestrator {
            service,
            config,
            scales,
            coordinate_space: None,
        })
    }

    /// Attach positions to `space` instead of resolving it from assignments.
    pub fn with_coordinate_space(mut self, space: CoordinateSpaceId) -> Self {
        self.coordinate_space = Some(space);
        self
    }

    /// Parse a raw JSONL datapoint blob and ingest it.
    pub fn ingest_jsonl(&self, blob: &str) -> Result<IngestReport, IngestError> {
        let parsed = parse_jsonl(blob);
        let malformed = parsed.malformed.len();
        let unsupported = parsed.unsupported;
        let mut report = self.ingest(&parsed.into_batches())?;
        report.malformed_lines = malformed;
        report.unsupported = unsupported;
        Ok(report)
    }

    /// Ingest raw records keyed by data type.
    pub fn ingest(&self, batches: &RawBatches) -> Result<IngestReport, IngestError> {
        let call_id = generate_call_id();
        let span = info_span!("ingest", call_id = %call_id);
        let _guard = span.enter();
        info!(
            target: event_names::INGEST_STARTED,
            records = batches.len(),
            "Starting ingestion call"
        );

        let saga = Saga::new(self.config.ingest.write_chunk_size);
        let mut call = Call {
            orchestrator: self,
            saga: &saga,
            identities: BTreeMap::new(),
            report: IngestReport {
                call_id,
                types: Vec::new(),
                coordinate_space: None,
                malformed_lines: 0,
                unsupported: 0,
            },
        };

        for data_type in DataType::PROCESSING_ORDER {
            if let Err(failure) = call.process(data_type, batches.get(data_type)) {
                let err = compensate(self.service, &saga, data_type, failure);
                error!(
                    target: event_names::INGEST_FAILED,
                    data_type = %data_type,
                    retryable = err.is_retryable(),
                    error = %err,
                    "Ingestion call failed"
                );
                return Err(err);
            }
        }

        saga.commit();
        info!(
            target: event_names::INGEST_FINISHED,
            written = call.report.total_written(),
            "Ingestion call committed"
        );
        Ok(call.report)
    }
}

/// Why a type's processing stopped, before compensation.
enum Failure {
    Resolve(ResolveError),
    Write(ServiceError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Resolve(e) => write!(f, "{}", e),
            Failure::Write(e) => write!(f, "{}", e),
        }
    }
}

fn compensate(
    service: &dyn QueryService,
    saga: &Saga,
    data_type: DataType,
    failure: Failure,
) -> IngestError {
    warn!(
        target: event_names::ROLLBACK_STARTED,
        data_type = %data_type,
        committed = saga.committed_count(),
        cause = %failure,
        "Rolling back ingestion call"
    );
    match saga.rollback(service) {
        Ok(rollback) => {
            info!(
                target: event_names::ROLLBACK_COMPLETED,
                deleted = rollback.deleted,
                batches = rollback.batches,
                "Rollback completed"
            );
            match failure {
                Failure::Resolve(source) => IngestError::Resolve {
                    data_type,
                    source,
                    rolled_back: rollback.deleted,
                },
                Failure::Write(source) => IngestError::Write {
                    data_type,
                    source,
                    rolled_back: rollback.deleted,
                },
            }
        }
        Err(source) => {
            error!(
                target: event_names::ROLLBACK_FAILED,
                remaining = source.remaining_count(),
                error = %source,
                "Rollback failed; manual cleanup required"
            );
            IngestError::RollbackFailed {
                data_type,
                cause: failure.to_string(),
                source,
            }
        }
    }
}

/// State of one ingestion call.
struct Call<'c, 'a> {
    orchestrator: &'c Orchestrator<'a>,
    saga: &'c Saga,
    /// Serial lookups done so far in this call; `None` means unresolved.
    identities: BTreeMap<SerialNumber, Option<DeviceIdentity>>,
    report: IngestReport,
}

impl Call<'_, '_> {
    fn resolve_identities(&mut self, raw: &[RawObservation]) -> Result<(), ResolveError> {
        let unseen: BTreeSet<&SerialNumber> = raw
            .iter()
            .map(|r| &r.serial_number)
            .filter(|s| !self.identities.contains_key(*s))
            .collect();
        if unseen.is_empty() {
            return Ok(());
        }
        let resolver = IdentityResolver::new(
            self.orchestrator.service,
            &self.orchestrator.config.resolver,
        );
        let mut resolved = resolver.resolve(unseen.iter().copied())?;
        for serial in unseen {
            let identity = resolved.remove(serial);
            self.identities.insert(serial.clone(), identity);
        }
        Ok(())
    }

    fn device_for(&self, serial: &SerialNumber) -> Option<DeviceId> {
        self.identities
            .get(serial)
            .and_then(Option::as_ref)
            .map(|identity| identity.device_id.clone())
    }

    fn coordinate_space(
        &mut self,
        readings: &[(Reading, DeviceId)],
        window: &TimeWindow,
    ) -> Result<CoordinateSpaceId, ResolveError> {
        if let Some(space) = &self.orchestrator.coordinate_space {
            return Ok(space.clone());
        }
        let devices: Vec<DeviceId> = readings
            .iter()
            .map(|(_, device)| device.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let resolver = CoordinateSpaceResolver::new(
            self.orchestrator.service,
            self.orchestrator.config.resolver.chunk_size,
        );
        let space = resolver.resolve(&devices, window)?;
        let id = space.space_id.clone();
        self.report.coordinate_space = Some(space);
        Ok(id)
    }

    fn process(&mut self, data_type: DataType, raw: &[RawObservation]) -> Result<(), Failure> {
        let mut type_report = TypeReport::empty(data_type, raw.len());
        if raw.is_empty() {
            warn!(
                target: event_names::INGEST_EMPTY_INPUT,
                data_type = %data_type,
                "No raw records of this type; skipping"
            );
            self.report.types.push(type_report);
            return Ok(());
        }

        self.resolve_identities(raw).map_err(Failure::Resolve)?;
        let kept: Vec<RawObservation> = raw
            .iter()
            .filter(|r| self.device_for(&r.serial_number).is_some())
            .cloned()
            .collect();
        type_report.unresolved = raw.len() - kept.len();

        let orchestrator = self.orchestrator;
        let decoder = Decoder::new(
            &orchestrator.scales,
            orchestrator.config.decode.motion_byte_width,
        );
        let decoded = decoder.decode_batch(&kept);
        type_report.skipped = decoded.skipped();
        if decoded.skipped() > 0 {
            warn!(
                target: event_names::DECODE_SKIPPED,
                data_type = %data_type,
                skipped = decoded.skipped(),
                "Skipped undecodable records"
            );
        }

        let readings: Vec<(Reading, DeviceId)> = decoded
            .readings
            .into_iter()
            .filter_map(|r| self.device_for(r.serial_number()).map(|d| (r, d)))
            .collect();
        let Some(window) = TimeWindow::covering(readings.iter().map(|(r, _)| r.timestamp())) else {
            warn!(
                target: event_names::INGEST_EMPTY_INPUT,
                data_type = %data_type,
                raw = raw.len(),
                "No records left to write after resolution and decoding"
            );
            self.report.types.push(type_report);
            return Ok(());
        };

        let observations: Vec<DecodedObservation> = if data_type == DataType::Position {
            let space = self.coordinate_space(&readings, &window).map_err(Failure::Resolve)?;
            readings
                .into_iter()
                .filter_map(|(reading, device)| match reading {
                    Reading::Position(p) => {
                        Some(DecodedObservation::position(&p, device, space.clone()))
                    }
                    Reading::Motion(_) => None,
                })
                .collect()
        } else {
            readings
                .into_iter()
                .filter_map(|(reading, device)| match reading {
                    Reading::Motion(m) => Some(DecodedObservation::motion(&m, device)),
                    Reading::Position(_) => None,
                })
                .collect()
        };

        type_report.ids = self.write(data_type, &observations)?;
        info!(
            target: event_names::INGEST_TYPE_COMMITTED,
            data_type = %data_type,
            raw = type_report.raw,
            unresolved = type_report.unresolved,
            skipped = type_report.skipped,
            written = type_report.written(),
            "Wrote observations"
        );
        self.report.types.push(type_report);
        Ok(())
    }

    fn write(
        &self,
        data_type: DataType,
        observations: &[DecodedObservation],
    ) -> Result<Vec<RecordId>, Failure> {
        let object_type = ObjectType::for_data_type(data_type);
        let chunk_size = self.orchestrator.config.ingest.write_chunk_size;
        let mut written = Vec::with_capacity(observations.len());
        for chunk in observations.chunks(chunk_size) {
            let records: Vec<Record> = chunk.iter().map(DecodedObservation::to_record).collect();
            let ids = self
                .orchestrator
                .service
                .create(object_type, &records)
                .map_err(Failure::Write)?;
            let returned = ids.len();
            self.saga.record(object_type, ids.clone());
            if returned != records.len() {
                return Err(Failure::Write(ServiceError::Rejected {
                    object_type,
                    message: format!(
                        "create returned {} ids for {} records",
                        returned,
                        records.len()
                    ),
                }));
            }
            debug!(object_type = %object_type, records = returned, "Wrote chunk");
            written.extend(ids);
        }
        Ok(written)
    }
}
