//! Service references and the reference tracker
//!
//! A `ServiceReference` binds a consumer to one published record. Handles
//! issued for the same record and configuration share one reference, and
//! therefore one lazily built service object. The tracker counts outstanding
//! handles; the close hook runs once, when the count drops to zero. Each
//! issued handle (and its clones) gives back at most one count.
//!
//! Lock order is always tracker map shard, then reference state. `release`
//! drops the reference state lock before touching the map.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use wayfinder_common::{DiscoveryError, Result, canonical_key, merge_objects};

use crate::model::{Record, TYPE_UNKNOWN};
use crate::notifier::{EventPublisher, UsageKind};
use crate::service_type::{ServiceObject, ServiceTypes};

struct ReferenceState {
    /// Handles issued minus releases
    outstanding: usize,
    service: Option<ServiceObject>,
    /// Set once `outstanding` reached zero; a closed reference never reopens
    closed: bool,
}

struct ReferenceInner {
    key: String,
    record: Record,
    config: Map<String, Value>,
    state: Mutex<ReferenceState>,
}

impl ReferenceInner {
    fn new(key: String, record: Record, config: Map<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            key,
            record,
            config,
            state: Mutex::new(ReferenceState {
                outstanding: 1,
                service: None,
                closed: false,
            }),
        })
    }
}

struct TrackerShared {
    /// Key: registration id + canonical config
    references: DashMap<String, Arc<ReferenceInner>>,
    types: Arc<ServiceTypes>,
    events: Arc<EventPublisher>,
}

/// Handle on a binding between a consumer and a published record
#[derive(Clone)]
pub struct ServiceReference {
    inner: Arc<ReferenceInner>,
    shared: Arc<TrackerShared>,
    /// Shared by clones of one issued handle; set once its count is given back
    released: Arc<AtomicBool>,
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("key", &self.inner.key)
            .field("name", &self.inner.record.name)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl ServiceReference {
    /// Record snapshot taken at bind time
    pub fn record(&self) -> &Record {
        &self.inner.record
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.inner.config
    }

    /// Service object, built on first call and cached afterwards.
    ///
    /// The factory receives `location`, `metadata` and the reference config
    /// merged in that order.
    pub fn get(&self) -> Result<ServiceObject> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(DiscoveryError::NotFound(format!(
                "released reference on '{}'",
                self.inner.record.name
            )));
        }
        if let Some(service) = &state.service {
            return Ok(service.clone());
        }

        let record = &self.inner.record;
        let service_type = self
            .shared
            .types
            .get(&record.service_type)
            .ok_or_else(|| DiscoveryError::UnsupportedType(record.service_type.clone()))?;

        let merged = merge_objects([&record.location, &record.metadata, &self.inner.config]);
        let service = service_type.build(&merged)?;
        debug!(
            name = %record.name,
            service_type = %record.service_type,
            "Built service object"
        );
        state.service = Some(service.clone());
        Ok(service)
    }

    /// Cached service object, if already built
    pub fn cached(&self) -> Option<ServiceObject> {
        self.inner.state.lock().service.clone()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    /// Whether this handle gave back its count, or the reference is closed
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst) || self.inner.state.lock().closed
    }

    /// Release this handle; see [`ReferenceTracker::release`]
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        release_inner(&self.shared, &self.inner)
    }

    /// Whether both handles point at the same underlying reference
    pub fn same_reference(&self, other: &ServiceReference) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn release_inner(shared: &TrackerShared, inner: &Arc<ReferenceInner>) -> bool {
    let service = {
        let mut state = inner.state.lock();
        if state.closed || state.outstanding == 0 {
            return false;
        }
        state.outstanding -= 1;
        if state.outstanding > 0 {
            debug!(
                name = %inner.record.name,
                outstanding = state.outstanding,
                "Released reference handle"
            );
            return true;
        }
        state.closed = true;
        state.service.take()
    };

    shared
        .references
        .remove_if(&inner.key, |_, current| Arc::ptr_eq(current, inner));

    if let Some(service) = service {
        match shared.types.get(&inner.record.service_type) {
            Some(service_type) => service_type.close(&service),
            None => warn!(
                service_type = %inner.record.service_type,
                "Service type unregistered before close, skipping close hook"
            ),
        }
    }

    info!(name = %inner.record.name, "Reference released");
    shared.events.usage(&inner.record, UsageKind::Release);
    true
}

/// Tracks every outstanding service reference of a discovery instance
#[derive(Clone)]
pub struct ReferenceTracker {
    shared: Arc<TrackerShared>,
}

impl ReferenceTracker {
    pub fn new(types: Arc<ServiceTypes>, events: Arc<EventPublisher>) -> Self {
        Self {
            shared: Arc::new(TrackerShared {
                references: DashMap::new(),
                types,
                events,
            }),
        }
    }

    pub fn types(&self) -> &Arc<ServiceTypes> {
        &self.shared.types
    }

    /// Bind to a published record.
    ///
    /// Equivalent requests (same registration id, same config) share one
    /// reference. Every call emits a `bind` usage event.
    pub fn get_reference(
        &self,
        record: &Record,
        config: Option<Map<String, Value>>,
    ) -> Result<ServiceReference> {
        let id = record
            .registration()
            .ok_or(DiscoveryError::MissingRegistrationId)?;
        if record.service_type == TYPE_UNKNOWN {
            return Err(DiscoveryError::UnsupportedType(TYPE_UNKNOWN.to_string()));
        }

        let config = config.unwrap_or_default();
        let key = format!("{}#{}", id, canonical_key(&config));

        let inner = match self.shared.references.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get().clone();
                let reused = {
                    let mut state = existing.state.lock();
                    if state.closed {
                        false
                    } else {
                        state.outstanding += 1;
                        true
                    }
                };
                if reused {
                    existing
                } else {
                    let fresh = ReferenceInner::new(key, record.clone(), config);
                    occupied.insert(fresh.clone());
                    fresh
                }
            }
            Entry::Vacant(vacant) => {
                let fresh = ReferenceInner::new(key, record.clone(), config);
                vacant.insert(fresh.clone());
                fresh
            }
        };

        debug!(registration = %id, name = %record.name, "Issued reference handle");
        self.shared.events.usage(record, UsageKind::Bind);

        Ok(ServiceReference {
            inner,
            shared: self.shared.clone(),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Release one handle.
    ///
    /// Returns `false` when this handle was already released or the reference
    /// is already fully released. The last
    /// release closes the service object (if built), drops the cache entry,
    /// and emits a `release` usage event.
    pub fn release(&self, reference: &ServiceReference) -> bool {
        reference.release()
    }

    /// Release one handle of the reference that produced `object`
    pub fn release_service_object(&self, object: &ServiceObject) -> bool {
        let owner = self.shared.references.iter().find_map(|entry| {
            let state = entry.value().state.lock();
            match &state.service {
                Some(service) if Arc::ptr_eq(service, object) => Some(entry.value().clone()),
                _ => None,
            }
        });

        match owner {
            Some(inner) => release_inner(&self.shared, &inner),
            None => false,
        }
    }

    fn open_references(&self) -> Vec<Arc<ReferenceInner>> {
        self.shared
            .references
            .iter()
            .filter(|entry| !entry.value().state.lock().closed)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of outstanding references.
    ///
    /// The returned handles are views: they own no count, so releasing one
    /// is a no-op.
    pub fn bindings(&self) -> Vec<ServiceReference> {
        self.open_references()
            .into_iter()
            .map(|inner| ServiceReference {
                inner,
                shared: self.shared.clone(),
                released: Arc::new(AtomicBool::new(true)),
            })
            .collect()
    }

    /// Fully release every outstanding reference, returning how many closed
    pub fn release_all(&self) -> usize {
        let mut closed = 0;
        for inner in self.open_references() {
            while release_inner(&self.shared, &inner) {
                if inner.state.lock().closed {
                    closed += 1;
                    break;
                }
            }
        }
        closed
    }
}
