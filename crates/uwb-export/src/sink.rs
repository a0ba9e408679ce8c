//! Artifact sinks: local filesystem and object storage.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uwb_common::config::SinkConfig;

use crate::error::ExportError;

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactLocation {
    Local { path: PathBuf },
    Object { bucket: String, key: String },
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::Local { path } => write!(f, "{}", path.display()),
            ArtifactLocation::Object { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// Destination for encoded artifacts. Must be shareable across workers.
pub trait ArtifactSink: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<ArtifactLocation, ExportError>;
}

/// Writes artifacts under a base directory, creating partitions as needed.
#[derive(Debug, Clone)]
pub struct LocalSink {
    base_dir: PathBuf,
}

impl LocalSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        LocalSink {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ArtifactSink for LocalSink {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<ArtifactLocation, ExportError> {
        let relative = Path::new(key);
        let contained = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(ExportError::Sink {
                key: key.to_string(),
                message: "key must be a relative path below the sink directory".to_string(),
            });
        }

        let path = self.base_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Readers must never see a partial artifact.
        let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);
        if let Err(err) = write_then_rename(&temp_path, &path, bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Wrote artifact");
        Ok(ArtifactLocation::Local { path })
    }
}

fn write_then_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(temp_path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    drop(writer);
    fs::rename(temp_path, path)
}

/// Minimal object storage client contract.
pub trait ObjectStorage: Send + Sync {
    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), String>;
}

/// Uploads artifacts to one bucket, keys optionally prefixed.
pub struct ObjectSink {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    prefix: String,
}

impl ObjectSink {
    pub fn new(storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        ObjectSink {
            storage,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }
}

impl ArtifactSink for ObjectSink {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<ArtifactLocation, ExportError> {
        let key = self.object_key(key);
        self.storage
            .put_object(&self.bucket, &key, bytes)
            .map_err(|message| ExportError::Sink {
                key: key.clone(),
                message,
            })?;
        debug!(bucket = %self.bucket, key = %key, bytes = bytes.len(), "Uploaded artifact");
        Ok(ArtifactLocation::Object {
            bucket: self.bucket.clone(),
            key,
        })
    }
}

/// Build the sink named by `config`. Object sinks need a storage client.
pub fn build_sink(
    config: &SinkConfig,
    storage: Option<Arc<dyn ObjectStorage>>,
) -> Result<Box<dyn ArtifactSink>, ExportError> {
    match config {
        SinkConfig::Local { base_dir } => Ok(Box::new(LocalSink::new(base_dir.clone()))),
        SinkConfig::Object { bucket, prefix } => {
            let storage = storage.ok_or_else(|| {
                ExportError::SinkConfig(format!("no object storage client for bucket '{}'", bucket))
            })?;
            Ok(Box::new(ObjectSink::new(storage, bucket.clone(), prefix.clone())))
        }
    }
}

/// In-process object storage for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    objects: std::sync::Mutex<std::collections::BTreeMap<(String, String), Vec<u8>>>,
    denied: std::sync::Mutex<std::collections::BTreeSet<String>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload whose key contains `fragment`.
    pub fn deny(&self, fragment: &str) {
        self.denied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fragment.to_string());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl ObjectStorage for MemoryObjectStorage {
    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), String> {
        let denied = self.denied.lock().unwrap_or_else(|e| e.into_inner());
        if denied.iter().any(|fragment| key.contains(fragment.as_str())) {
            return Err(format!("access denied for {}", key));
        }
        drop(denied);
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_sink_creates_partitions() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path());
        let location = sink
            .put("classroom/2024/03/05/datapoint_20240305_140709_DP1.json", b"{}")
            .unwrap();
        let ArtifactLocation::Local { path } = location else {
            panic!("expected a local location");
        };
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(path.starts_with(dir.path().join("classroom/2024/03/05")));
        assert!(!path.with_file_name("datapoint_20240305_140709_DP1.json.tmp").exists());
    }

    #[test]
    fn test_local_sink_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path());
        sink.put("a/b.json", b"old").unwrap();
        sink.put("a/b.json", b"new").unwrap();
        assert_eq!(fs::read(dir.path().join("a/b.json")).unwrap(), b"new");
    }

    #[test]
    fn test_local_sink_rejects_keys_outside_base_dir() {
        let root = TempDir::new().unwrap();
        let base = root.path().join("artifacts");
        let sink = LocalSink::new(&base);
        for key in ["../escape.json", "a/../../escape.json", "/tmp/abs.json", ""] {
            let err = sink.put(key, b"{}").unwrap_err();
            assert!(matches!(err, ExportError::Sink { .. }), "{key}: {err}");
        }
        assert!(!root.path().join("escape.json").exists());
        assert!(!base.exists());
    }

    #[test]
    fn test_local_sink_removes_temp_file_on_failure() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path());
        // A non-empty directory at the target path makes the rename fail.
        fs::create_dir_all(dir.path().join("a/b.json/inner")).unwrap();
        assert!(sink.put("a/b.json", b"{}").is_err());
        assert!(!dir.path().join("a/b.json.tmp").exists());
        assert!(dir.path().join("a/b.json/inner").is_dir());
    }

    #[test]
    fn test_object_sink_prefixes_and_reports_url() {
        let storage = Arc::new(MemoryObjectStorage::new());
        let sink = ObjectSink::new(storage.clone(), "uwb-archive", "raw/");
        let location = sink.put("classroom/x.json.gz", b"zz").unwrap();
        assert_eq!(location.to_string(), "s3://uwb-archive/raw/classroom/x.json.gz");
        assert_eq!(
            storage.get("uwb-archive", "raw/classroom/x.json.gz"),
            Some(b"zz".to_vec())
        );
    }

    #[test]
    fn test_object_sink_maps_upload_failure() {
        let storage = Arc::new(MemoryObjectStorage::new());
        storage.deny("secret");
        let sink = ObjectSink::new(storage, "b", "");
        let err = sink.put("secret/x.json", b"{}").unwrap_err();
        assert!(matches!(err, ExportError::Sink { ref key, .. } if key == "secret/x.json"));
    }

    #[test]
    fn test_build_sink_requires_storage_for_objects() {
        let config = SinkConfig::Object {
            bucket: "b".into(),
            prefix: String::new(),
        };
        assert!(matches!(
            build_sink(&config, None),
            Err(ExportError::SinkConfig(_))
        ));
        assert!(build_sink(&config, Some(Arc::new(MemoryObjectStorage::new()))).is_ok());
    }
}
