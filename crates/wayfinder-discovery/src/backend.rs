//! Record storage backends
//!
//! The registry persists records through the `DiscoveryBackend` trait. Two
//! implementations ship with the crate: an in-memory map and a directory of
//! JSON files.

pub mod file;
pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wayfinder_common::Result;

use crate::model::Record;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Record storage trait
///
/// Each operation must be atomic per id. No ordering across ids is assumed.
#[async_trait::async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Store a new record; `DuplicateId` if the id is taken
    async fn create(&self, id: &str, record: &Record) -> Result<()>;

    /// Read one record; `NotFound` if absent
    async fn read(&self, id: &str) -> Result<Record>;

    /// Overwrite an existing record; `NotFound` if absent
    async fn update(&self, id: &str, record: &Record) -> Result<()>;

    /// Remove and return a record; `NotFound` if absent
    async fn delete(&self, id: &str) -> Result<Record>;

    /// All stored records, in backend enumeration order
    async fn list_all(&self) -> Result<Vec<Record>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Backend selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendOptions {
    #[default]
    Memory,
    File {
        dir: String,
    },
}

/// Build the backend described by `options`
pub fn backend_from_options(options: &BackendOptions) -> Arc<dyn DiscoveryBackend> {
    match options {
        BackendOptions::Memory => Arc::new(MemoryBackend::new()),
        BackendOptions::File { dir } => Arc::new(FileBackend::new(dir.clone())),
    }
}
