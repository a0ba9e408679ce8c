//! Per-datapoint export artifacts.
//!
//! Each stored datapoint becomes one JSON document mapping data type to its
//! decoded records, keyed under `<environment>/<YYYY>/<MM>/<DD>/`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};
use uwb_common::{DataType, DatapointId};
use uwb_core::{Datapoint, DecodedObservation, Record};
use uwb_wire::{parse_jsonl, Decoder, Reading};

use crate::error::ExportError;
use crate::scope::ResolvedScope;

/// Decoded records of one datapoint, grouped by type.
pub type ArtifactBody = BTreeMap<DataType, Vec<Record>>;

/// An encoded artifact ready for a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub datapoint_id: DatapointId,
    pub key: String,
    pub bytes: Vec<u8>,
    pub records: usize,
}

/// Sink key for a datapoint:
/// `<env>/<YYYY>/<MM>/<DD>/datapoint_<YYYYMMDD>_<HHMMSS>_<id>.json[.gz]`.
pub fn artifact_key(
    environment_name: &str,
    timestamp: DateTime<Utc>,
    datapoint_id: &DatapointId,
    gzip: bool,
) -> String {
    format!(
        "{}/{}/datapoint_{}_{}.json{}",
        environment_name,
        timestamp.format("%Y/%m/%d"),
        timestamp.format("%Y%m%d_%H%M%S"),
        datapoint_id,
        if gzip { ".gz" } else { "" }
    )
}

/// Serialize a body, gzipping in memory when asked.
pub fn encode_body(body: &ArtifactBody, gzip: bool) -> Result<Vec<u8>, ExportError> {
    let json = serde_json::to_vec(body)?;
    if !gzip {
        return Ok(json);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`encode_body`].
pub fn decode_body(bytes: &[u8], gzip: bool) -> Result<ArtifactBody, ExportError> {
    if !gzip {
        return Ok(serde_json::from_slice(bytes)?);
    }
    let mut json = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Stored blobs are either raw JSONL or JSONL wrapped in a JSON string.
fn unwrap_blob(datapoint: &Datapoint) -> Result<String, ExportError> {
    let blob = datapoint.raw_jsonl_blob.trim_start();
    if !blob.starts_with('"') {
        return Ok(datapoint.raw_jsonl_blob.clone());
    }
    serde_json::from_str::<String>(blob).map_err(|e| ExportError::MalformedDatapoint {
        datapoint_id: datapoint.id.to_string(),
        message: format!("string-wrapped blob is not valid JSON: {}", e),
    })
}

/// Decode one datapoint against a resolved scope.
///
/// Returns `Ok(None)` when nothing in the blob is both supported and from a
/// tag in scope. Malformed lines and undecodable records are skipped with a
/// warning.
pub fn build_body(
    datapoint: &Datapoint,
    scope: &ResolvedScope,
    decoder: &Decoder<'_>,
) -> Result<Option<ArtifactBody>, ExportError> {
    let blob = unwrap_blob(datapoint)?;
    let parsed = parse_jsonl(&blob);
    if !parsed.malformed.is_empty() {
        warn!(
            datapoint_id = %datapoint.id,
            malformed = parsed.malformed.len(),
            first_line = parsed.malformed[0].0,
            "Omitting malformed lines from datapoint"
        );
    }

    let mut unknown = BTreeSet::new();
    let in_scope: Vec<_> = parsed
        .observations
        .into_iter()
        .filter(|obs| {
            let known = scope.devices.contains_key(&obs.serial_number);
            if !known {
                unknown.insert(obs.serial_number.clone());
            }
            known
        })
        .collect();
    if !unknown.is_empty() {
        debug!(
            datapoint_id = %datapoint.id,
            serials = ?unknown,
            "Dropping records from serials outside the export scope"
        );
    }

    let decoded = decoder.decode_batch(&in_scope);
    if decoded.skipped() > 0 {
        warn!(
            datapoint_id = %datapoint.id,
            skipped = decoded.skipped(),
            "Skipping undecodable records"
        );
    }

    let mut body = ArtifactBody::new();
    for reading in &decoded.readings {
        let Some(device) = scope.devices.get(reading.serial_number()) else {
            continue;
        };
        let observation = match reading {
            Reading::Position(p) => {
                let Some(space) = &scope.coordinate_space else {
                    continue;
                };
                DecodedObservation::position(p, device.clone(), space.clone())
            }
            Reading::Motion(m) => DecodedObservation::motion(m, device.clone()),
        };
        body.entry(observation.data_type())
            .or_default()
            .push(observation.to_record());
    }

    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(body))
}

/// Decode and encode one datapoint; `Ok(None)` when it holds no supported data.
pub fn build_artifact(
    datapoint: &Datapoint,
    scope: &ResolvedScope,
    decoder: &Decoder<'_>,
    gzip: bool,
) -> Result<Option<Artifact>, ExportError> {
    let Some(body) = build_body(datapoint, scope, decoder)? else {
        return Ok(None);
    };
    let records = body.values().map(Vec::len).sum();
    Ok(Some(Artifact {
        datapoint_id: datapoint.id.clone(),
        key: artifact_key(&scope.environment.name, datapoint.timestamp, &datapoint.id, gzip),
        bytes: encode_body(&body, gzip)?,
        records,
    }))
}
