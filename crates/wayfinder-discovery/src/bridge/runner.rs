//! Bridge runner - starts, tracks and stops the bridges of a discovery instance
//!
//! Bridges are independent: each owns its timer and its imported view, and
//! nothing orders one bridge against another.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tracing::info;
use wayfinder_common::{DiscoveryError, Result};

use super::{Bridge, ManagedBridge, SourceAdapter};
use crate::options::BridgeOptions;
use crate::registry::Registry;

pub struct BridgeRunner {
    registry: Registry,
    /// Key: bridge name
    bridges: DashMap<String, Arc<dyn ManagedBridge>>,
}

impl BridgeRunner {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            bridges: DashMap::new(),
        }
    }

    /// Create and start a bridge over `source`.
    ///
    /// Resolves once the initial scan has run. A start failure leaves nothing
    /// scheduled and nothing registered.
    pub async fn register<S: SourceAdapter>(
        &self,
        source: S,
        options: BridgeOptions,
    ) -> Result<Bridge<S>> {
        let bridge = Bridge::new(source, self.registry.clone(), options);
        let name = bridge.name().to_string();
        if self.bridges.contains_key(&name) {
            return Err(DiscoveryError::Configuration(format!(
                "bridge '{}' already registered",
                name
            )));
        }

        bridge.start().await?;

        let duplicate = match self.bridges.entry(name.clone()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(bridge.clone()));
                false
            }
        };
        if duplicate {
            bridge.stop().await;
            return Err(DiscoveryError::Configuration(format!(
                "bridge '{}' already registered",
                name
            )));
        }

        info!(bridge = %name, "Registered bridge");
        Ok(bridge)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedBridge>> {
        self.bridges.get(name).map(|entry| entry.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bridges.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Stop and forget one bridge; `false` if unknown
    pub async fn stop(&self, name: &str) -> bool {
        match self.bridges.remove(name) {
            Some((_, bridge)) => {
                bridge.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every bridge concurrently
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.bridges.iter().map(|e| e.key().clone()).collect();
        let bridges: Vec<Arc<dyn ManagedBridge>> = names
            .iter()
            .filter_map(|name| self.bridges.remove(name).map(|(_, bridge)| bridge))
            .collect();

        if bridges.is_empty() {
            return;
        }
        info!(count = bridges.len(), "Stopping bridges");
        join_all(bridges.iter().map(|bridge| bridge.stop())).await;
    }
}
