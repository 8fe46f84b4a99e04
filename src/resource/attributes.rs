//! Attribute Store
//!
//! Path-addressable document holding the normalized properties of one
//! resource. Paths use dot notation (`settings.tier`); numeric segments
//! address sequence elements when reading.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors raised while mutating an attribute document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    #[error("Path {path} cannot be set: {segment} is not a nested struct")]
    PathConflict { path: String, segment: String },

    #[error("Path must not be empty")]
    EmptyPath,
}

/// Normalized resource properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a document from a JSON value. Non-object values yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Read the raw value at `path`
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;

        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Read a string at `path`
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Write `value` at `path`, creating intermediate mappings on demand
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), AttributeError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(AttributeError::EmptyPath);
        };
        if last.is_empty() {
            return Err(AttributeError::EmptyPath);
        }

        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(AttributeError::PathConflict {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            };
        }

        current.insert(last.to_string(), value.into());
        Ok(())
    }

    /// Remove the value at `path` and every ancestor left empty.
    /// Missing segments make this a no-op. A list element is nulled rather
    /// than removed, so indices stay stable; a list left holding only zero
    /// values is removed.
    pub fn delete(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('.').collect();
        delete_in(&mut self.0, &segments);
    }

    /// Remove the value at `path` if it holds its type's zero value
    pub fn delete_if_default(&mut self, path: &str) {
        if self.get(path).is_some_and(is_default) {
            self.delete(path);
        }
    }

    /// Copy of this document without zero scalars and empty collections
    pub fn sanitize_defaults(&self) -> Attributes {
        Attributes(sanitize_map(&self.0))
    }

    /// Dotted paths of every leaf value, sorted
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for (key, value) in &self.0 {
            flatten_into(key.clone(), value, &mut out);
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn delete_in(map: &mut Map<String, Value>, segments: &[&str]) {
    match segments {
        [] => {}
        [leaf] => {
            map.remove(*leaf);
        }
        [head, rest @ ..] => {
            let Some(child) = map.get_mut(*head) else {
                return;
            };
            if delete_in_value(child, rest) {
                map.remove(*head);
            }
        }
    }
}

/// Returns true when `value` was emptied by the deletion
fn delete_in_value(value: &mut Value, segments: &[&str]) -> bool {
    match value {
        Value::Object(map) if !map.is_empty() => {
            delete_in(map, segments);
            map.is_empty()
        }
        Value::Array(items) if !items.is_empty() => {
            let Some((head, rest)) = segments.split_first() else {
                return false;
            };
            let Some(idx) = head.parse::<usize>().ok().filter(|i| *i < items.len()) else {
                return false;
            };
            if !rest.is_empty() && !delete_in_value(&mut items[idx], rest) {
                return false;
            }
            items[idx] = Value::Null;
            items.iter().all(is_default)
        }
        _ => false,
    }
}

/// Whether a value is a zero scalar or an empty collection
pub fn is_default(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn sanitize_value(value: &Value) -> Option<Value> {
    let cleaned = match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().filter_map(sanitize_value).collect()),
        other => other.clone(),
    };

    if is_default(&cleaned) {
        None
    } else {
        Some(cleaned)
    }
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter_map(|(key, value)| sanitize_value(value).map(|v| (key.clone(), v)))
        .collect()
}

fn flatten_into(path: String, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(format!("{}.{}", path, key), child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (idx, child) in items.iter().enumerate() {
                flatten_into(format!("{}.{}", path, idx), child, out);
            }
        }
        leaf => out.push((path, leaf.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        Attributes::from_value(value).unwrap()
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let a = attrs(json!({
            "settings": {"tier": "db-f1-micro", "ip": [{"name": "a"}]}
        }));

        assert_eq!(a.get("settings.tier"), Some(&json!("db-f1-micro")));
        assert_eq!(a.get_str("settings.ip.0.name"), Some("a"));
        assert!(a.get("settings.missing").is_none());
        assert!(a.get("settings.tier.deeper").is_none());
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut a = Attributes::new();
        a.set("labels.env", "prod").unwrap();
        a.set("labels.team", "core").unwrap();

        assert_eq!(a.get("labels"), Some(&json!({"env": "prod", "team": "core"})));
    }

    #[test]
    fn test_set_path_conflict() {
        let mut a = attrs(json!({"name": "db"}));
        let err = a.set("name.first", "x").unwrap_err();

        assert_eq!(
            err,
            AttributeError::PathConflict {
                path: "name.first".to_string(),
                segment: "name".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Path name.first cannot be set: name is not a nested struct"
        );
    }

    #[test]
    fn test_delete_removes_empty_ancestors() {
        let mut a = attrs(json!({"a": {"b": {"c": 1}}, "keep": true}));
        a.delete("a.b.c");

        assert_eq!(a.into_value(), json!({"keep": true}));
    }

    #[test]
    fn test_delete_missing_path_is_noop() {
        let mut a = attrs(json!({"a": {"b": 1}}));
        a.delete("a.x.y");
        a.delete("nope");
        a.delete("a.b.c");

        assert_eq!(a.into_value(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_delete_list_element_is_idempotent() {
        let mut a = attrs(json!({"k": 1, "list": ["a", "b"]}));
        a.delete("list.0");
        let once = a.clone();
        a.delete("list.0");

        assert_eq!(a, once);
        assert_eq!(a.get("list"), Some(&json!([null, "b"])));

        a.delete("list.1");
        assert_eq!(a.into_value(), json!({"k": 1}));
    }

    #[test]
    fn test_delete_inside_list_element() {
        let mut a = attrs(json!({"settings": [{"tier": "small", "version": 3}]}));
        a.delete("settings.0.version");
        assert_eq!(a.get("settings"), Some(&json!([{"tier": "small"}])));

        a.delete("settings.0.tier");
        assert!(a.is_empty());
    }

    #[test]
    fn test_delete_if_default() {
        let mut a = attrs(json!({"enabled": false, "size": 10}));
        a.delete_if_default("enabled");
        a.delete_if_default("size");

        assert_eq!(a.into_value(), json!({"size": 10}));
    }

    #[test]
    fn test_sanitize_defaults_strips_recursively() {
        let a = attrs(json!({
            "name": "db",
            "empty_str": "",
            "zero": 0,
            "nil": null,
            "off": false,
            "list": [],
            "nested": {"inner": {"gone": ""}, "kept": 3},
            "blocks": [{"x": ""}]
        }));

        let sanitized = a.sanitize_defaults();
        assert_eq!(
            sanitized.into_value(),
            json!({"name": "db", "nested": {"kept": 3}})
        );
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let a = attrs(json!({"a": [1, {"b": ""}, 0], "c": {"d": {}}}));
        let once = a.sanitize_defaults();
        let twice = once.sanitize_defaults();

        assert_eq!(once, twice);
        assert_eq!(once.into_value(), json!({"a": [1]}));
    }

    #[test]
    fn test_flatten() {
        let a = attrs(json!({"b": {"c": 1}, "a": ["x"]}));
        let flat: Vec<String> = a.flatten().into_iter().map(|(k, _)| k).collect();

        assert_eq!(flat, vec!["a.0", "b.c"]);
    }
}
