//! Service type registry
//!
//! A service type turns a record's merged configuration into a usable
//! service object and knows how to close it. Types are registered explicitly
//! at startup and looked up by the record's `type` tag.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::info;
use wayfinder_common::Result;

/// Type-erased service object (client, proxy, handle...)
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

type BuildFn = Arc<dyn Fn(&Map<String, Value>) -> Result<ServiceObject> + Send + Sync>;
type CloseFn = Arc<dyn Fn(&ServiceObject) + Send + Sync>;

/// Typed view of a service object
pub fn downcast<T: Any + Send + Sync>(object: &ServiceObject) -> Option<Arc<T>> {
    object.clone().downcast::<T>().ok()
}

/// Factory and close hook for one type tag
pub struct ServiceType {
    tag: String,
    build: BuildFn,
    close: CloseFn,
}

impl ServiceType {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn build(&self, config: &Map<String, Value>) -> Result<ServiceObject> {
        (self.build)(config)
    }

    pub fn close(&self, object: &ServiceObject) {
        (self.close)(object)
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceType")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Type tag -> service type
#[derive(Default)]
pub struct ServiceTypes {
    types: DashMap<String, Arc<ServiceType>>,
}

impl ServiceTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `tag`
    pub fn register_factory<B, C>(&self, tag: impl Into<String>, build: B, close: C)
    where
        B: Fn(&Map<String, Value>) -> Result<ServiceObject> + Send + Sync + 'static,
        C: Fn(&ServiceObject) + Send + Sync + 'static,
    {
        let tag = tag.into();
        info!(service_type = %tag, "Registered service type");
        self.types.insert(
            tag.clone(),
            Arc::new(ServiceType {
                tag,
                build: Arc::new(build),
                close: Arc::new(close),
            }),
        );
    }

    pub fn get(&self, tag: &str) -> Option<Arc<ServiceType>> {
        self.types.get(tag).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.types.iter().map(|entry| entry.key().clone()).collect()
    }
}
