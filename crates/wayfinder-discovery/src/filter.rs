//! Record filters
//!
//! A filter is either a JSON object whose entries must all match the record,
//! or a predicate over the record. By default only `UP` records pass; a JSON
//! filter overrides that by naming `status`, a predicate by setting
//! `include_non_up`.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use wayfinder_common::{WILDCARD, scalar_to_string};

use crate::model::{FIELD_STATUS, Record};

type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Record filter
#[derive(Clone)]
pub enum Filter {
    /// Conjunction of `key -> expected value` entries (`"*"` = key present)
    Json(Map<String, Value>),
    /// Arbitrary predicate
    Predicate {
        predicate: Predicate,
        include_non_up: bool,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(map) => f.debug_tuple("Json").field(map).finish(),
            Self::Predicate { include_non_up, .. } => f
                .debug_struct("Predicate")
                .field("include_non_up", include_non_up)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(value: Map<String, Value>) -> Self {
        Self::Json(value)
    }
}

impl Filter {
    /// Empty JSON filter: matches every `UP` record
    pub fn all() -> Self {
        Self::Json(Map::new())
    }

    /// Build a JSON filter from a `serde_json::json!` object.
    ///
    /// Non-object values produce the empty filter.
    pub fn json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Json(map),
            _ => Self::all(),
        }
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            predicate: Arc::new(predicate),
            include_non_up: false,
        }
    }

    /// Let a predicate filter see records whose status is not `UP`.
    ///
    /// No effect on JSON filters, which use the `status` key instead.
    pub fn include_non_up(self) -> Self {
        match self {
            Self::Predicate { predicate, .. } => Self::Predicate {
                predicate,
                include_non_up: true,
            },
            json => json,
        }
    }

    /// Whether the filter itself lifts the `UP`-only default.
    fn overrides_status(&self) -> bool {
        match self {
            Self::Json(map) => map.contains_key(FIELD_STATUS),
            Self::Predicate { include_non_up, .. } => *include_non_up,
        }
    }

    /// Apply the filter and the status policy to a record.
    ///
    /// `include_non_up` comes from the caller (lookup flag) and is OR-ed with
    /// the filter's own override.
    pub fn accepts(&self, record: &Record, include_non_up: bool) -> bool {
        if !include_non_up && !self.overrides_status() && !record.status.is_up() {
            return false;
        }
        self.matches(record)
    }

    /// Raw match, without the status policy
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Json(map) => map
                .iter()
                .all(|(key, expected)| entry_matches(record, key, expected)),
            Self::Predicate { predicate, .. } => predicate(record),
        }
    }
}

/// Resolve a filter key: top-level fields, then metadata, then location.
fn resolve(record: &Record, key: &str) -> Option<Value> {
    record
        .field(key)
        .or_else(|| record.metadata.get(key).cloned())
        .or_else(|| record.location.get(key).cloned())
}

fn entry_matches(record: &Record, key: &str, expected: &Value) -> bool {
    let Some(actual) = resolve(record, key) else {
        return false;
    };

    match expected {
        Value::String(s) if s == WILDCARD => true,
        Value::String(s) => match scalar_to_string(&actual) {
            Some(actual) => actual == *s,
            None => false,
        },
        other => actual == *other,
    }
}
