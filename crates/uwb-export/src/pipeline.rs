//! Bulk export pipeline.
//!
//! Resolves a scope once, then exports each datapoint independently: fetch,
//! decode, encode, hand to the sink. A datapoint that fails is recorded in
//! the report and the rest carry on.

use std::thread;

use serde::Serialize;
use tracing::{error, info, info_span, warn};
use uwb_common::config::{validate_config, PipelineConfig};
use uwb_common::DatapointId;
use uwb_core::logging::{event_names, generate_call_id};
use uwb_core::{DatapointStore, QueryService};
use uwb_wire::{Decoder, ScaleTable};

use crate::artifact::build_artifact;
use crate::error::ExportError;
use crate::scope::{resolve_scope, ExportScope, ResolvedScope};
use crate::sink::{ArtifactLocation, ArtifactSink};

/// One artifact handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedArtifact {
    pub datapoint_id: DatapointId,
    pub location: ArtifactLocation,
    pub records: usize,
    pub bytes: usize,
}

/// A datapoint that could not be exported.
#[derive(Debug)]
pub struct ExportFailure {
    pub datapoint_id: DatapointId,
    pub error: ExportError,
}

/// Outcome of one export run. Artifacts are in datapoint timestamp order.
#[derive(Debug)]
pub struct ExportReport {
    pub call_id: String,
    pub considered: usize,
    pub artifacts: Vec<ExportedArtifact>,
    /// Datapoints with no supported data from tags in scope.
    pub empty: Vec<DatapointId>,
    pub failures: Vec<ExportFailure>,
}

impl ExportReport {
    fn new(call_id: String) -> Self {
        ExportReport {
            call_id,
            considered: 0,
            artifacts: Vec::new(),
            empty: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn locations(&self) -> Vec<&ArtifactLocation> {
        self.artifacts.iter().map(|a| &a.location).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ExportPipeline<'a> {
    service: &'a dyn QueryService,
    store: &'a dyn DatapointStore,
    sink: &'a dyn ArtifactSink,
    config: &'a PipelineConfig,
    scales: ScaleTable,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(
        service: &'a dyn QueryService,
        store: &'a dyn DatapointStore,
        sink: &'a dyn ArtifactSink,
        config: &'a PipelineConfig,
    ) -> Result<Self, ExportError> {
        validate_config(config)?;
        Ok(ExportPipeline {
            service,
            store,
            sink,
            config,
            scales: ScaleTable::from_config(&config.decode)?,
        })
    }

    /// Export every datapoint in `scope`.
    ///
    /// Only scope resolution failures abort the run; per-datapoint failures
    /// land in [`ExportReport::failures`].
    pub fn run(&self, scope: &ExportScope) -> Result<ExportReport, ExportError> {
        let call_id = generate_call_id();
        let span = info_span!("export", call_id = %call_id);
        let _guard = span.enter();
        info!(
            target: event_names::EXPORT_STARTED,
            environment = %scope.environment_name,
            window = %scope.window,
            "Starting export"
        );

        let resolved = resolve_scope(
            self.service,
            scope,
            &self.config.resolver,
            self.config.export.query_chunk_size,
        )?;
        let mut report = ExportReport::new(call_id);
        report.considered = resolved.datapoints.len();

        let outcomes = self.export_all(&resolved);
        for ((datapoint_id, _), outcome) in resolved.datapoints.iter().zip(outcomes) {
            match outcome {
                Ok(Some(artifact)) => {
                    info!(
                        target: event_names::EXPORT_ARTIFACT_WRITTEN,
                        datapoint_id = %datapoint_id,
                        location = %artifact.location,
                        records = artifact.records,
                        "Exported datapoint"
                    );
                    report.artifacts.push(artifact);
                }
                Ok(None) => {
                    info!(
                        target: event_names::EXPORT_DATAPOINT_EMPTY,
                        datapoint_id = %datapoint_id,
                        "Datapoint has no supported data"
                    );
                    report.empty.push(datapoint_id.clone());
                }
                Err(error) => {
                    warn!(
                        target: event_names::EXPORT_DATAPOINT_FAILED,
                        datapoint_id = %datapoint_id,
                        error = %error,
                        "Datapoint export failed"
                    );
                    report.failures.push(ExportFailure {
                        datapoint_id: datapoint_id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            target: event_names::EXPORT_FINISHED,
            considered = report.considered,
            artifacts = report.artifacts.len(),
            empty = report.empty.len(),
            failed = report.failures.len(),
            "Export finished"
        );
        Ok(report)
    }

    /// One outcome per datapoint, in scope order.
    fn export_all(
        &self,
        scope: &ResolvedScope,
    ) -> Vec<Result<Option<ExportedArtifact>, ExportError>> {
        let ids: Vec<&DatapointId> = scope.datapoints.iter().map(|(id, _)| id).collect();
        let workers = self.config.export.workers;
        if workers == 1 || ids.len() <= 1 {
            return ids.iter().map(|id| self.export_one(scope, id)).collect();
        }

        ids.chunks(workers)
            .flat_map(|chunk| {
                thread::scope(|s| {
                    let handles: Vec<_> = chunk
                        .iter()
                        .map(|id| s.spawn(move || self.export_one(scope, id)))
                        .collect();

                    handles
                        .into_iter()
                        .map(|h| {
                            h.join().unwrap_or_else(|_| {
                                error!("export worker thread panicked");
                                Err(ExportError::Sink {
                                    key: String::new(),
                                    message: "worker thread panicked".to_string(),
                                })
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect()
    }

    fn export_one(
        &self,
        scope: &ResolvedScope,
        id: &DatapointId,
    ) -> Result<Option<ExportedArtifact>, ExportError> {
        let datapoint = self.store.get_datapoint(id)?;
        let decoder = Decoder::new(&self.scales, self.config.decode.motion_byte_width);
        let Some(artifact) = build_artifact(&datapoint, scope, &decoder, self.config.export.gzip)?
        else {
            return Ok(None);
        };
        let location = self.sink.put(&artifact.key, &artifact.bytes)?;
        Ok(Some(ExportedArtifact {
            datapoint_id: artifact.datapoint_id,
            location,
            records: artifact.records,
            bytes: artifact.bytes.len(),
        }))
    }
}
