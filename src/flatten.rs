//! Flatten nested translation sources into dotted item paths.
//!
//! `{"throttle": {"short": "Slow down"}}` becomes `{"throttle.short": "Slow down"}`,
//! the flat shape [`crate::store::MergeRequest`] takes.

use crate::key::PATH_SEPARATOR;
use serde_json::Value;
use std::collections::BTreeMap;

/// Flatten a JSON value into `path -> text`.
///
/// Strings are taken as-is; numbers and booleans use their JSON rendering;
/// nulls are skipped. Array elements are addressed by index. A scalar at the
/// top level has no path and yields an empty map.
pub fn flatten_json(value: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    walk(value, String::new(), &mut out);
    out
}

fn walk(value: &Value, path: String, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, join(&path, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, join(&path, &index.to_string()), out);
            }
        }
        Value::Null => {}
        Value::String(s) if !path.is_empty() => {
            out.insert(path, s.clone());
        }
        Value::Bool(_) | Value::Number(_) if !path.is_empty() => {
            out.insert(path, value.to_string());
        }
        _ => {}
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, segment)
    }
}
