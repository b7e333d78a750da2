//! File catalog source
//!
//! Bridges a static YAML or JSON catalog file into the registry. The file is
//! re-read on every fetch, so editing it while the server runs publishes,
//! updates and withdraws records on the next poll.
//!
//! ```yaml
//! - name: orders
//!   host: 10.0.0.1
//!   port: 8080
//!   root: /api
//!   metadata:
//!     zone: east
//! - id: billing-primary
//!   name: billing
//!   type: grpc
//!   host: 10.0.0.2
//!   port: 9090
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use wayfinder_common::{DiscoveryError, Result};
use wayfinder_discovery::{HttpEndpoint, Record, SourceAdapter, Status, TYPE_HTTP_ENDPOINT};

/// One service in the catalog file
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CatalogEntry {
    /// Stable key; `name@host:port` when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Service type; `http-endpoint` when absent
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<CatalogEntry>),
    Services { services: Vec<CatalogEntry> },
}

impl CatalogDocument {
    fn into_entries(self) -> Vec<CatalogEntry> {
        match self {
            Self::List(entries) => entries,
            Self::Services { services } => services,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CatalogFormat {
    Yaml,
    Json,
}

impl CatalogFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Source adapter over a catalog file
pub struct FileCatalogSource {
    name: String,
    path: PathBuf,
    format: CatalogFormat,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = CatalogFormat::of(&path);
        Self {
            name: "file-catalog".to_string(),
            path,
            format,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse catalog content.
    ///
    /// Blank content is an error rather than an empty catalog: a file caught
    /// mid-write must not withdraw everything. Write `[]` for an empty catalog.
    fn parse(&self, content: &str) -> Result<Vec<CatalogEntry>> {
        if content.trim().is_empty() {
            return Err(DiscoveryError::SourceUnavailable(format!(
                "catalog {} is empty",
                self.path.display()
            )));
        }

        let document: CatalogDocument = match self.format {
            CatalogFormat::Json => serde_json::from_str(content).map_err(|e| {
                DiscoveryError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
            })?,
            CatalogFormat::Yaml => serde_yaml::from_str(content).map_err(|e| {
                DiscoveryError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
            })?,
        };
        Ok(document.into_entries())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for FileCatalogSource {
    type Entry = CatalogEntry;

    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => {
                info!(path = %self.path.display(), format = ?self.format, "Using catalog file");
                Ok(())
            }
            Ok(_) => Err(DiscoveryError::Configuration(format!(
                "catalog {} is not a file",
                self.path.display()
            ))),
            Err(e) => Err(DiscoveryError::Configuration(format!(
                "catalog {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<CatalogEntry>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DiscoveryError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let entries = self.parse(&content)?;
        debug!(path = %self.path.display(), entries = entries.len(), "Read catalog");
        Ok(entries)
    }

    fn external_key_of(&self, entry: &CatalogEntry) -> String {
        match &entry.id {
            Some(id) => id.clone(),
            None => format!("{}@{}:{}", entry.name, entry.host, entry.port),
        }
    }

    fn to_record(&self, entry: &CatalogEntry) -> Record {
        let mut record = match entry.service_type.as_deref() {
            None | Some(TYPE_HTTP_ENDPOINT) => HttpEndpoint::create_record(
                &entry.name,
                entry.ssl,
                &entry.host,
                entry.port,
                &entry.root,
                Some(entry.metadata.clone()),
            ),
            Some(other) => {
                let mut record = Record::new(&entry.name)
                    .with_type(other)
                    .with_location("host", entry.host.clone())
                    .with_location("port", entry.port);
                record.metadata = entry.metadata.clone();
                record
            }
        };
        if let Some(status) = entry.status {
            record.status = status;
        }
        record
    }
}
