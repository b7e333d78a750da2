//! Wayfinder Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across Wayfinder crates:
//! - The `DiscoveryError` taxonomy and `Result` alias
//! - JSON object helpers

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{DiscoveryError, Result};
pub use utils::{canonical_key, merge_objects, scalar_to_string};

/// Default topic for arrival / departure announcements
pub const DEFAULT_ANNOUNCE_TOPIC: &str = "wayfinder.discovery.announce";

/// Default topic for service usage (bind / release) events
pub const DEFAULT_USAGE_TOPIC: &str = "wayfinder.discovery.usage";

/// Default holder identity of a discovery instance
pub const DEFAULT_HOLDER_NAME: &str = "localhost";

/// Wildcard filter value: key present, any value
pub const WILDCARD: &str = "*";
