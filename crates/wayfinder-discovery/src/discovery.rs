//! Discovery instance
//!
//! Explicit init / teardown for one process-local view of the registry:
//! construct with a backend and a notifier, `close()` when done.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tracing::info;
use wayfinder_common::{DiscoveryError, Result};

use crate::backend::{DiscoveryBackend, backend_from_options};
use crate::bridge::{Bridge, BridgeRunner, ManagedBridge, SourceAdapter};
use crate::filter::Filter;
use crate::model::Record;
use crate::notifier::{EventPublisher, Notifier};
use crate::options::{BridgeOptions, DiscoveryOptions};
use crate::reference::{ReferenceTracker, ServiceReference};
use crate::registry::Registry;
use crate::service_type::{ServiceObject, ServiceTypes};

pub struct ServiceDiscovery {
    options: DiscoveryOptions,
    registry: Registry,
    tracker: ReferenceTracker,
    bridges: BridgeRunner,
    events: Arc<EventPublisher>,
    closed: AtomicBool,
}

impl ServiceDiscovery {
    pub fn new(
        options: DiscoveryOptions,
        backend: Arc<dyn DiscoveryBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let events = Arc::new(EventPublisher::new(
            notifier,
            options.announce_topic.clone(),
            options.usage_topic.clone(),
            options.name.clone(),
        ));
        let registry = Registry::new(backend.clone(), events.clone());
        let tracker = ReferenceTracker::new(Arc::new(ServiceTypes::new()), events.clone());
        let bridges = BridgeRunner::new(registry.clone());

        info!(
            name = %options.name,
            backend = backend.name(),
            announce_topic = %options.announce_topic,
            usage_enabled = events.usage_enabled(),
            "Discovery instance created"
        );

        Self {
            options,
            registry,
            tracker,
            bridges,
            events,
            closed: AtomicBool::new(false),
        }
    }

    /// Build with the backend named in `options.backend`
    pub fn from_options(options: DiscoveryOptions, notifier: Arc<dyn Notifier>) -> Self {
        let backend = backend_from_options(&options.backend);
        Self::new(options, backend, notifier)
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tracker(&self) -> &ReferenceTracker {
        &self.tracker
    }

    pub fn service_types(&self) -> &Arc<ServiceTypes> {
        self.tracker.types()
    }

    pub fn bridges(&self) -> &BridgeRunner {
        &self.bridges
    }

    pub async fn publish(&self, record: Record) -> Result<Record> {
        self.registry.publish(record).await
    }

    pub async fn unpublish(&self, id: &str) -> Result<Record> {
        self.registry.unpublish(id).await
    }

    pub async fn update(&self, record: &Record) -> Result<()> {
        self.registry.update(record).await
    }

    pub async fn lookup(&self, filter: &Filter) -> Result<Option<Record>> {
        self.registry.lookup(filter, false).await
    }

    pub async fn lookup_all(&self, filter: &Filter) -> Result<Vec<Record>> {
        self.registry.lookup_all(filter, false).await
    }

    /// Bind to a published record; fails once the instance is closed
    pub fn get_reference(
        &self,
        record: &Record,
        config: Option<Map<String, Value>>,
    ) -> Result<ServiceReference> {
        self.ensure_open()?;
        self.tracker.get_reference(record, config)
    }

    pub fn release(&self, reference: &ServiceReference) -> bool {
        self.tracker.release(reference)
    }

    pub fn release_service_object(&self, object: &ServiceObject) -> bool {
        self.tracker.release_service_object(object)
    }

    pub fn bindings(&self) -> Vec<ServiceReference> {
        self.tracker.bindings()
    }

    /// Start a bridge over `source`; resolves after its initial scan
    pub async fn register_bridge<S: SourceAdapter>(
        &self,
        source: S,
        options: BridgeOptions,
    ) -> Result<Bridge<S>> {
        self.ensure_open()?;
        let bridge = self.bridges.register(source, options).await?;
        if self.is_closed() {
            // close() raced the start and may have missed this bridge
            self.bridges.stop(bridge.name()).await;
            return Err(self.closed_error());
        }
        Ok(bridge)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> DiscoveryError {
        DiscoveryError::Configuration(format!(
            "discovery instance '{}' is closed",
            self.options.name
        ))
    }

    /// Stop every bridge, release every outstanding reference, then go silent.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(name = %self.options.name, "Closing discovery instance");

        self.bridges.stop_all().await;
        let released = self.tracker.release_all();
        self.events.close();

        info!(released, "Discovery instance closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::BroadcastNotifier;

    #[tokio::test]
    async fn test_from_options_uses_memory_backend() {
        let discovery = ServiceDiscovery::from_options(
            DiscoveryOptions::default(),
            Arc::new(BroadcastNotifier::default()),
        );
        assert_eq!(discovery.registry().backend().name(), "memory");
        assert!(!discovery.is_closed());
        assert!(discovery.bridges().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe();
        let discovery =
            ServiceDiscovery::from_options(DiscoveryOptions::default(), Arc::new(notifier));

        discovery.close().await;
        discovery.close().await;
        assert!(discovery.is_closed());

        // Registry keeps working, silently
        discovery.publish(Record::new("late")).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
