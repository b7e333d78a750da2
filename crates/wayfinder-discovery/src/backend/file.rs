//! File-based backend
//!
//! One pretty-printed JSON file per record: `<dir>/<registration id>.json`.
//! Updates are written to `.<id>.json.tmp` and renamed over the record, so
//! readers see the old or the new content, never a partial file.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;
use wayfinder_common::{DiscoveryError, Result};

use super::DiscoveryBackend;
use crate::model::Record;

/// Directory-backed record store
pub struct FileBackend {
    base_dir: PathBuf,
    /// Serializes mutations so check-then-write stays atomic per id
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(DiscoveryError::NotFound(id.to_string()));
        }
        Ok(self.base_dir.join(format!("{}.json", id)))
    }

    async fn read_path(path: &Path, id: &str) -> Result<Record> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DiscoveryError::NotFound(id.to_string()))
            }
            Err(e) => Err(DiscoveryError::BackendUnavailable(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_path(path: &Path, record: &Record) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = Self::temp_path(path);
        fs::write(&tmp, json.as_bytes()).await.map_err(|e| {
            DiscoveryError::BackendUnavailable(format!("write {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DiscoveryError::BackendUnavailable(format!(
                "replace {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.tmp", file_name))
    }

    async fn exists(path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(|e| {
            DiscoveryError::BackendUnavailable(format!("stat {}: {}", path.display(), e))
        })
    }
}

#[async_trait::async_trait]
impl DiscoveryBackend for FileBackend {
    async fn create(&self, id: &str, record: &Record) -> Result<()> {
        let path = self.record_path(id)?;
        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            DiscoveryError::BackendUnavailable(format!("create dir: {}", e))
        })?;

        let json = serde_json::to_string_pretty(record)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DiscoveryError::DuplicateId(id.to_string()));
            }
            Err(e) => return Err(DiscoveryError::BackendUnavailable(e.to_string())),
        };

        file.write_all(json.as_bytes())
            .await
            .map_err(|e| DiscoveryError::BackendUnavailable(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| DiscoveryError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Record> {
        let path = self.record_path(id)?;
        Self::read_path(&path, id).await
    }

    async fn update(&self, id: &str, record: &Record) -> Result<()> {
        let path = self.record_path(id)?;
        let _guard = self.write_lock.lock().await;

        if !Self::exists(&path).await? {
            return Err(DiscoveryError::NotFound(id.to_string()));
        }
        Self::write_path(&path, record).await
    }

    async fn delete(&self, id: &str) -> Result<Record> {
        let path = self.record_path(id)?;
        let _guard = self.write_lock.lock().await;

        let record = Self::read_path(&path, id).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| DiscoveryError::BackendUnavailable(e.to_string()))?;
        Ok(record)
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        if !Self::exists(&self.base_dir).await? {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| DiscoveryError::BackendUnavailable(e.to_string()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DiscoveryError::BackendUnavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                // Deleted between listing and reading
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(DiscoveryError::BackendUnavailable(e.to_string())),
            };
            match serde_json::from_str::<Record>(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record file {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
