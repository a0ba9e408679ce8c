//! No-mock integration tests for the bulk export pipeline.
//!
//! Runs the real pipeline against the in-memory query service, datapoint
//! store and object storage, and covers:
//! - Empty scopes and datapoints without supported data
//! - Collect-and-continue when one datapoint fails
//! - Gzip artifacts under day partitions on the local filesystem
//! - Object storage locations
//! - Worker pools keeping datapoint order

use std::fs;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use uwb_common::config::{PipelineConfig, SinkConfig};
use uwb_common::{DataType, DatapointId, TimeWindow};
use uwb_core::memory::MemoryService;
use uwb_core::Datapoint;
use uwb_export::{
    build_sink, decode_body, ArtifactLocation, ExportError, ExportPipeline, ExportScope,
    LocalSink, MemoryObjectStorage, ObjectStorage,
};

// ============================================================================
// Fixtures
// ============================================================================

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

fn window() -> TimeWindow {
    TimeWindow::new(at(2, 0), at(4, 0)).unwrap()
}

fn position_line(serial: &str, ts: DateTime<Utc>) -> String {
    json!({
        "type": "position",
        "serial_number": serial,
        "timestamp": ts.to_rfc3339(),
        "x": 2000, "y": 500, "z": 0, "quality": 70, "anchor_count": 4,
    })
    .to_string()
}

fn gyro_line(serial: &str, ts: DateTime<Utc>) -> String {
    json!({
        "type": "gyroscope",
        "serial_number": serial,
        "timestamp": ts.to_rfc3339(),
        "x": 0, "y": 2147483647i64, "z": 0, "scale": 250,
    })
    .to_string()
}

/// One tag (S1->D1) in "classroom" with a coordinate space, no datapoints.
fn classroom() -> MemoryService {
    let service = MemoryService::new();
    service.insert_environment("E1", "classroom");
    service.insert_device("D1", "S1", "UWBTAG");
    service.insert_assignment("A1", "D1", "E1", at(1, 0), None);
    service.insert_coordinate_space("SPACE-1", "classroom-2024", "E1", at(1, 0), None);
    service
}

fn add_datapoint(service: &MemoryService, id: &str, ts: DateTime<Utc>, blob: String) {
    service.insert_datapoint(Datapoint {
        id: id.into(),
        timestamp: ts,
        source_assignment_id: "A1".into(),
        raw_jsonl_blob: blob,
    });
}

fn both_lines(ts: DateTime<Utc>) -> String {
    format!("{}\n{}", position_line("S1", ts), gyro_line("S1", ts))
}

fn config(gzip: bool, workers: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.export.gzip = gzip;
    config.export.workers = workers;
    config
}

// ============================================================================
// Scope edge cases
// ============================================================================

#[test]
fn environment_without_assignments_exports_nothing() {
    let service = classroom();
    service.insert_environment("E2", "library");
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline
        .run(&ExportScope::new("library", window()))
        .unwrap();
    assert_eq!(report.considered, 0);
    assert!(report.artifacts.is_empty());
    assert!(report.is_complete());
}

#[test]
fn unknown_environment_aborts_the_run() {
    let service = classroom();
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let err = pipeline
        .run(&ExportScope::new("gym", window()))
        .unwrap_err();
    assert!(matches!(err, ExportError::Resolve(_)));
    let common: uwb_common::Error = err.into();
    assert_eq!(common.code(), 25);
}

#[test]
fn datapoint_without_supported_data_is_skipped() {
    let service = classroom();
    add_datapoint(
        &service,
        "DP1",
        at(2, 6),
        json!({"type": "status", "serial_number": "S1", "timestamp": at(2, 6).to_rfc3339()})
            .to_string(),
    );
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    assert_eq!(report.considered, 1);
    assert!(report.artifacts.is_empty());
    assert_eq!(report.empty, vec![DatapointId::from("DP1")]);
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

// ============================================================================
// Local sink
// ============================================================================

#[test]
fn gzip_artifact_lands_in_day_partition() {
    let service = classroom();
    let ts = Utc.with_ymd_and_hms(2024, 1, 3, 9, 30, 15).unwrap();
    add_datapoint(&service, "DP7", ts, both_lines(ts));
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    assert_eq!(report.artifacts.len(), 1);
    let expected = dir
        .path()
        .join("classroom/2024/01/03/datapoint_20240103_093015_DP7.json.gz");
    assert_eq!(
        report.artifacts[0].location,
        ArtifactLocation::Local {
            path: expected.clone()
        }
    );

    let body = decode_body(&fs::read(&expected).unwrap(), true).unwrap();
    assert_eq!(body[&DataType::Position][0]["coordinates"], json!([2.0, 0.5, 0.0]));
    assert_eq!(body[&DataType::Position][0]["object"], json!("D1"));
    assert_eq!(body[&DataType::Gyroscope][0]["data"], json!([0.0, 250.0, 0.0]));
    assert_eq!(report.artifacts[0].records, 2);
}

#[test]
fn plain_json_when_gzip_disabled() {
    let service = classroom();
    add_datapoint(&service, "DP1", at(2, 6), both_lines(at(2, 6)));
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(false, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    let ArtifactLocation::Local { path } = &report.artifacts[0].location else {
        panic!("expected a local artifact");
    };
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
    let value: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    assert!(value.get("position").is_some());
}

#[test]
fn datapoints_outside_the_range_are_not_exported() {
    let service = classroom();
    add_datapoint(&service, "EARLY", at(1, 6), both_lines(at(1, 6)));
    add_datapoint(&service, "IN", at(3, 0), both_lines(at(3, 0)));
    add_datapoint(&service, "EDGE", at(4, 0), both_lines(at(4, 0)));
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    let ids: Vec<&str> = report
        .artifacts
        .iter()
        .map(|a| a.datapoint_id.as_str())
        .collect();
    assert_eq!(ids, vec!["IN", "EDGE"]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn one_failing_datapoint_does_not_abort_the_others() {
    let service = classroom();
    add_datapoint(&service, "DP1", at(2, 6), both_lines(at(2, 6)));
    add_datapoint(&service, "DP2", at(2, 7), both_lines(at(2, 7)));
    add_datapoint(&service, "DP3", at(2, 8), both_lines(at(2, 8)));
    service.fail_datapoint(&DatapointId::from("DP2"));
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].datapoint_id.as_str(), "DP2");
    assert!(matches!(report.failures[0].error, ExportError::Service(_)));
    assert!(!report.is_complete());
}

#[test]
fn sink_failures_are_reported_per_datapoint() {
    let service = classroom();
    add_datapoint(&service, "DP1", at(2, 6), both_lines(at(2, 6)));
    add_datapoint(&service, "DP2", at(2, 7), both_lines(at(2, 7)));
    let storage = Arc::new(MemoryObjectStorage::new());
    storage.deny("_DP1.");
    let sink = build_sink(
        &SinkConfig::Object {
            bucket: "uwb-archive".into(),
            prefix: String::new(),
        },
        Some(storage.clone() as Arc<dyn ObjectStorage>),
    )
    .unwrap();
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, sink.as_ref(), &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    assert_eq!(report.artifacts.len(), 1);
    assert!(matches!(report.failures[0].error, ExportError::Sink { .. }));
}

// ============================================================================
// Object sink and workers
// ============================================================================

#[test]
fn object_sink_reports_bucket_urls() {
    let service = classroom();
    add_datapoint(&service, "DP1", at(2, 6), both_lines(at(2, 6)));
    let storage = Arc::new(MemoryObjectStorage::new());
    let sink = build_sink(
        &SinkConfig::Object {
            bucket: "uwb-archive".into(),
            prefix: "raw".into(),
        },
        Some(storage.clone() as Arc<dyn ObjectStorage>),
    )
    .unwrap();
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, sink.as_ref(), &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    assert_eq!(
        report.artifacts[0].location.to_string(),
        "s3://uwb-archive/raw/classroom/2024/01/02/datapoint_20240102_060000_DP1.json.gz"
    );
    assert_eq!(storage.keys().len(), 1);
}

#[test]
fn worker_pool_keeps_datapoint_order() {
    let service = classroom();
    for hour in 0..10 {
        let ts = at(2, hour);
        add_datapoint(&service, &format!("DP{}", hour), ts, both_lines(ts));
    }
    let storage = Arc::new(MemoryObjectStorage::new());
    let sink = build_sink(
        &SinkConfig::Object {
            bucket: "b".into(),
            prefix: String::new(),
        },
        Some(storage.clone() as Arc<dyn ObjectStorage>),
    )
    .unwrap();
    let config = config(true, 4);
    let pipeline = ExportPipeline::new(&service, &service, sink.as_ref(), &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    let ids: Vec<String> = report
        .artifacts
        .iter()
        .map(|a| a.datapoint_id.to_string())
        .collect();
    let expected: Vec<String> = (0..10).map(|h| format!("DP{}", h)).collect();
    assert_eq!(ids, expected);
    assert_eq!(storage.keys().len(), 10);
}

// ============================================================================
// Configuration and device types
// ============================================================================

#[test]
fn zero_workers_is_a_config_error() {
    let service = classroom();
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 0);
    let Err(err) = ExportPipeline::new(&service, &service, &sink, &config) else {
        panic!("zero workers must be rejected");
    };
    assert!(matches!(err, ExportError::Config(_)));
    let common: uwb_common::Error = err.into();
    assert_eq!(common.code(), 11);
}

#[test]
fn assigned_cameras_are_left_out_of_the_scope() {
    let service = classroom();
    service.insert_device("C1", "SC1", "CAMERA");
    service.insert_assignment("A2", "C1", "E1", at(1, 0), None);
    let ts = at(2, 6);
    service.insert_datapoint(Datapoint {
        id: "DP-CAM".into(),
        timestamp: ts,
        source_assignment_id: "A2".into(),
        raw_jsonl_blob: position_line("SC1", ts),
    });
    add_datapoint(&service, "DP-TAG", ts, both_lines(ts));
    let dir = TempDir::new().unwrap();
    let sink = LocalSink::new(dir.path());
    let config = config(true, 1);
    let pipeline = ExportPipeline::new(&service, &service, &sink, &config).unwrap();

    let report = pipeline.run(&ExportScope::new("classroom", window())).unwrap();
    assert_eq!(report.considered, 1);
    let ids: Vec<String> = report
        .artifacts
        .iter()
        .map(|a| a.datapoint_id.to_string())
        .collect();
    assert_eq!(ids, ["DP-TAG"]);
}
