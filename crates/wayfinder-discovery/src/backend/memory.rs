//! In-memory backend

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use wayfinder_common::{DiscoveryError, Result};

use super::DiscoveryBackend;
use crate::model::Record;

/// Process-local record store backed by a `DashMap`
#[derive(Default)]
pub struct MemoryBackend {
    /// Key: registration id
    records: DashMap<String, Record>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl DiscoveryBackend for MemoryBackend {
    async fn create(&self, id: &str, record: &Record) -> Result<()> {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(_) => Err(DiscoveryError::DuplicateId(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn read(&self, id: &str) -> Result<Record> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, record: &Record) -> Result<()> {
        match self.records.get_mut(id) {
            Some(mut entry) => {
                *entry = record.clone();
                Ok(())
            }
            None => Err(DiscoveryError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<Record> {
        self.records
            .remove(id)
            .map(|(_, record)| record)
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
