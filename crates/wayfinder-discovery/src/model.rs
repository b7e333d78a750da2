//! Discovery data models
//!
//! This module defines the record shared by providers and consumers:
//! - Record status
//! - The service record itself
//! - Helpers for well-known service types

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// Service type constants
pub const TYPE_UNKNOWN: &str = "unknown";
pub const TYPE_HTTP_ENDPOINT: &str = "http-endpoint";

// Record field names, also used as filter keys
pub const FIELD_NAME: &str = "name";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_REGISTRATION: &str = "registration";

/// Availability of a published service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Up,
    Down,
    OutOfService,
    /// Not set yet; replaced by `Up` at publish time
    #[default]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::OutOfService => "OUT_OF_SERVICE",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service record
///
/// A record without a `registration` id is unpublished. Records handed out by
/// lookups are snapshots: mutating them has no effect until `update` is called.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Record {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub status: Status,
    pub location: Map<String, Value>,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_type: TYPE_UNKNOWN.to_string(),
            status: Status::Unknown,
            location: Map::new(),
            metadata: Map::new(),
            registration: None,
        }
    }
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_location(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.location.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_published(&self) -> bool {
        self.registration.is_some()
    }

    pub fn registration(&self) -> Option<&str> {
        self.registration.as_deref()
    }

    /// Value of a top-level record field, by its serialized name
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            FIELD_NAME => Some(Value::String(self.name.clone())),
            FIELD_TYPE => Some(Value::String(self.service_type.clone())),
            FIELD_STATUS => Some(Value::String(self.status.as_str().to_string())),
            FIELD_REGISTRATION => self.registration.clone().map(Value::String),
            _ => None,
        }
    }

    /// Whether the content (everything but the registration id) is equal
    pub fn same_content(&self, other: &Record) -> bool {
        self.name == other.name
            && self.service_type == other.service_type
            && self.status == other.status
            && self.location == other.location
            && self.metadata == other.metadata
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Helpers for `http-endpoint` records
pub struct HttpEndpoint;

impl HttpEndpoint {
    /// Build an unpublished record for a REST endpoint.
    ///
    /// The location carries `host`, `port`, `root`, `ssl` and the computed
    /// `endpoint` URL.
    pub fn create_record(
        name: impl Into<String>,
        ssl: bool,
        host: &str,
        port: u16,
        root: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Record {
        let root = if root.is_empty() {
            "/".to_string()
        } else if root.starts_with('/') {
            root.to_string()
        } else {
            format!("/{}", root)
        };
        let scheme = if ssl { "https" } else { "http" };
        let endpoint = format!("{}://{}:{}{}", scheme, host, port, root);

        let mut record = Record::new(name).with_type(TYPE_HTTP_ENDPOINT);
        if let Value::Object(location) = json!({
            "host": host,
            "port": port,
            "root": root,
            "ssl": ssl,
            "endpoint": endpoint,
        }) {
            record.location = location;
        }
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        record
    }
}
