//! Utility functions for Wayfinder
//!
//! JSON object helpers shared by record matching and service-object
//! configuration.

use serde_json::{Map, Value};

/// Merge `sources` into a fresh object, later sources overriding earlier ones.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use wayfinder_common::merge_objects;
///
/// let a = json!({"host": "a", "port": 80}).as_object().cloned().unwrap();
/// let b = json!({"host": "b"}).as_object().cloned().unwrap();
/// let merged = merge_objects([&a, &b]);
/// assert_eq!(merged["host"], "b");
/// assert_eq!(merged["port"], 80);
/// ```
pub fn merge_objects<'a, I>(sources: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Map<String, Value>>,
{
    let mut merged = Map::new();
    for source in sources {
        for (key, value) in source {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Canonical string form of an object, independent of insertion order.
///
/// Used as a cache key, so two maps with the same entries produce the same
/// string.
pub fn canonical_key(object: &Map<String, Value>) -> String {
    let mut entries: Vec<(&String, &Value)> = object.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .iter()
        .map(|(k, v)| format!("{}={}", k, canonical_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("{{{}}}", canonical_key(map)),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(canonical_value).collect::<Vec<_>>().join(",")
        ),
        other => other.to_string(),
    }
}

/// String form of a scalar JSON value (`"a"` -> `a`, `8080` -> `8080`).
///
/// Returns `None` for objects and arrays.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
