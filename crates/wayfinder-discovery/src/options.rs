//! Discovery and bridge options
//!
//! Both structs deserialize with defaults for every field, so a partial
//! configuration file (or none at all) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfinder_common::{
    DEFAULT_ANNOUNCE_TOPIC, DEFAULT_HOLDER_NAME, DEFAULT_USAGE_TOPIC, DiscoveryError, Result,
};

use crate::backend::BackendOptions;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5000;

/// Options of a discovery instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiscoveryOptions {
    /// Topic for arrival / departure announcements
    pub announce_topic: String,
    /// Topic for bind / release events; `None` or empty disables them
    pub usage_topic: Option<String>,
    /// Holder identity reported in usage events
    pub name: String,
    pub backend: BackendOptions,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            announce_topic: DEFAULT_ANNOUNCE_TOPIC.to_string(),
            usage_topic: Some(DEFAULT_USAGE_TOPIC.to_string()),
            name: DEFAULT_HOLDER_NAME.to_string(),
            backend: BackendOptions::default(),
        }
    }
}

impl DiscoveryOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn without_usage(mut self) -> Self {
        self.usage_topic = None;
        self
    }
}

/// Options of one bridge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BridgeOptions {
    /// Bridge name; defaults to the source adapter's name
    pub name: Option<String>,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Unpublish imported records when the bridge stops
    pub retract_on_stop: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            name: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            retract_on_stop: false,
        }
    }
}

impl BridgeOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retract_on_stop(mut self, retract: bool) -> Self {
        self.retract_on_stop = retract;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(DiscoveryError::Configuration(
                "poll-interval-ms must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(DiscoveryError::Configuration(
                "fetch-timeout-ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
