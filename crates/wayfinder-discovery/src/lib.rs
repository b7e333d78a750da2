//! Wayfinder Discovery - Service discovery registry
//!
//! This crate provides:
//! - Service records and filters
//! - Pluggable record backends (memory, file)
//! - The registry (publish / unpublish / update / lookup)
//! - Service types and reference tracking with leak-free release
//! - Bridges that reconcile the registry with external catalogs
//! - The `ServiceDiscovery` instance tying it all together

pub mod backend;
pub mod bridge;
pub mod discovery;
pub mod filter;
pub mod model;
pub mod notifier;
pub mod options;
pub mod reference;
pub mod registry;
pub mod service_type;

// Re-export commonly used types
pub use backend::{BackendOptions, DiscoveryBackend, FileBackend, MemoryBackend};
pub use bridge::{Bridge, BridgeRunner, BridgeState, ManagedBridge, ScanReport, SourceAdapter};
pub use discovery::ServiceDiscovery;
pub use filter::Filter;
pub use model::{HttpEndpoint, Record, Status, TYPE_HTTP_ENDPOINT, TYPE_UNKNOWN};
pub use notifier::{BroadcastNotifier, EventPublisher, Notification, Notifier, NoopNotifier, UsageKind};
pub use options::{BridgeOptions, DiscoveryOptions};
pub use reference::{ReferenceTracker, ServiceReference};
pub use registry::Registry;
pub use service_type::{ServiceObject, ServiceTypes, downcast};
pub use wayfinder_common::{DiscoveryError, Result};
