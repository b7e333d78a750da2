//! Service registry
//!
//! Publish / unpublish / update / lookup over a pluggable backend. The
//! registry keeps no state of its own: concurrent mutations are as atomic as
//! the backend makes them per id.

use std::sync::Arc;

use tracing::{debug, info};
use wayfinder_common::{DiscoveryError, Result};

use crate::backend::DiscoveryBackend;
use crate::filter::Filter;
use crate::model::{Record, Status};
use crate::notifier::EventPublisher;

/// Single source of truth for published records
#[derive(Clone)]
pub struct Registry {
    backend: Arc<dyn DiscoveryBackend>,
    events: Arc<EventPublisher>,
}

impl Registry {
    pub fn new(backend: Arc<dyn DiscoveryBackend>, events: Arc<EventPublisher>) -> Self {
        Self { backend, events }
    }

    pub fn backend(&self) -> &Arc<dyn DiscoveryBackend> {
        &self.backend
    }

    /// Publish an unpublished record.
    ///
    /// Assigns a fresh registration id, sets status `UP` when unset, and
    /// announces the arrival.
    pub async fn publish(&self, record: Record) -> Result<Record> {
        if let Some(id) = record.registration() {
            return Err(DiscoveryError::AlreadyRegistered(id.to_string()));
        }

        let mut record = record;
        let id = uuid::Uuid::new_v4().to_string();
        record.registration = Some(id.clone());
        if record.status == Status::Unknown {
            record.status = Status::Up;
        }

        self.backend.create(&id, &record).await?;

        info!(
            registration = %id,
            name = %record.name,
            service_type = %record.service_type,
            "Published record"
        );
        self.events.announce(&record, record.status);
        Ok(record)
    }

    /// Withdraw a published record and announce its departure.
    pub async fn unpublish(&self, id: &str) -> Result<Record> {
        let record = self.backend.delete(id).await?;

        info!(registration = %id, name = %record.name, "Withdrew record");
        self.events.announce(&record, Status::Down);
        Ok(record)
    }

    /// Overwrite a published record, keeping its registration id.
    ///
    /// Only a status change is announced; content-only updates are silent.
    pub async fn update(&self, record: &Record) -> Result<()> {
        let id = record
            .registration()
            .ok_or(DiscoveryError::MissingRegistrationId)?;

        let previous = self.backend.read(id).await?;
        self.backend.update(id, record).await?;

        debug!(registration = %id, name = %record.name, "Updated record");
        if previous.status != record.status {
            info!(
                registration = %id,
                from = %previous.status,
                to = %record.status,
                "Record status changed"
            );
            self.events.announce(record, record.status);
        }
        Ok(())
    }

    /// Direct read by registration id; `None` when absent
    pub async fn record(&self, id: &str) -> Result<Option<Record>> {
        match self.backend.read(id).await {
            Ok(record) => Ok(Some(record)),
            Err(DiscoveryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// First matching record in backend enumeration order
    pub async fn lookup(&self, filter: &Filter, include_non_up: bool) -> Result<Option<Record>> {
        let records = self.backend.list_all().await?;
        Ok(records
            .into_iter()
            .find(|record| filter.accepts(record, include_non_up)))
    }

    /// Every matching record, in backend enumeration order
    pub async fn lookup_all(&self, filter: &Filter, include_non_up: bool) -> Result<Vec<Record>> {
        let records = self.backend.list_all().await?;
        Ok(records
            .into_iter()
            .filter(|record| filter.accepts(record, include_non_up))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::notifier::{BroadcastNotifier, Notification};
    use serde_json::json;
    use tokio::sync::broadcast;

    fn registry() -> (Registry, broadcast::Receiver<Notification>) {
        let notifier = BroadcastNotifier::default();
        let rx = notifier.subscribe();
        let events = Arc::new(EventPublisher::new(
            Arc::new(notifier),
            "announce",
            Some("usage".to_string()),
            "localhost",
        ));
        (Registry::new(Arc::new(MemoryBackend::new()), events), rx)
    }

    #[tokio::test]
    async fn test_publish_assigns_id_once() {
        let (registry, mut rx) = registry();

        let published = registry.publish(Record::new("orders")).await.unwrap();
        let id = published.registration().unwrap().to_string();
        assert_eq!(published.status, Status::Up);

        let err = registry.publish(published.clone()).await.unwrap_err();
        assert_eq!(err, DiscoveryError::AlreadyRegistered(id));

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.topic, "announce");
        assert_eq!(msg.payload["status"], "UP");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_keeps_explicit_status() {
        let (registry, _rx) = registry();
        let published = registry
            .publish(Record::new("maint").with_status(Status::OutOfService))
            .await
            .unwrap();
        assert_eq!(published.status, Status::OutOfService);
    }

    #[tokio::test]
    async fn test_unpublish_exactly_once() {
        let (registry, mut rx) = registry();
        let published = registry.publish(Record::new("orders")).await.unwrap();
        let id = published.registration().unwrap();
        let _ = rx.try_recv();

        let removed = registry.unpublish(id).await.unwrap();
        assert_eq!(removed.name, "orders");
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.payload["status"], "DOWN");

        let err = registry.unpublish(id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_requires_registration() {
        let (registry, _rx) = registry();
        let err = registry.update(&Record::new("x")).await.unwrap_err();
        assert_eq!(err, DiscoveryError::MissingRegistrationId);

        let mut ghost = Record::new("ghost");
        ghost.registration = Some("missing".to_string());
        assert!(registry.update(&ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_preserves_id_and_is_silent() {
        let (registry, mut rx) = registry();
        let mut published = registry.publish(Record::new("orders")).await.unwrap();
        let _ = rx.try_recv();

        published.metadata.insert("version".to_string(), json!("2"));
        registry.update(&published).await.unwrap();
        assert!(rx.try_recv().is_err());

        let stored = registry
            .record(published.registration().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata["version"], "2");
        assert_eq!(stored.registration, published.registration);
    }

    #[tokio::test]
    async fn test_status_change_is_announced() {
        let (registry, mut rx) = registry();
        let mut published = registry.publish(Record::new("orders")).await.unwrap();
        let _ = rx.try_recv();

        published.status = Status::OutOfService;
        registry.update(&published).await.unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.payload["status"], "OUT_OF_SERVICE");
    }

    #[tokio::test]
    async fn test_filter_wildcard_semantics() {
        let (registry, _rx) = registry();
        registry
            .publish(Record::new("a").with_metadata("color", "red"))
            .await
            .unwrap();
        registry
            .publish(Record::new("b").with_metadata("color", "blue"))
            .await
            .unwrap();

        let any = registry
            .lookup_all(&Filter::json(json!({"color": "*"})), false)
            .await
            .unwrap();
        assert_eq!(any.len(), 2);

        let red = registry
            .lookup_all(&Filter::json(json!({"color": "red"})), false)
            .await
            .unwrap();
        assert_eq!(red.len(), 1);
        assert_eq!(red[0].name, "a");

        assert_eq!(registry.lookup_all(&Filter::all(), false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_exclusion_default() {
        let (registry, _rx) = registry();
        registry
            .publish(Record::new("oos").with_status(Status::OutOfService))
            .await
            .unwrap();

        assert!(registry.lookup_all(&Filter::all(), false).await.unwrap().is_empty());
        assert_eq!(
            registry
                .lookup_all(&Filter::json(json!({"status": "*"})), false)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(registry.lookup(&Filter::all(), true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lookup_absent_is_none() {
        let (registry, _rx) = registry();
        let found = registry
            .lookup(&Filter::json(json!({"name": "nothing"})), false)
            .await
            .unwrap();
        assert!(found.is_none());
        assert!(registry.record("missing").await.unwrap().is_none());
    }
}
