//! Variable contexts with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Reserved variable holding the target namespace
pub const NAMESPACE_KEY: &str = "namespace";

/// Reserved variable holding the shard parameters (`null` when unsharded)
pub const SHARD_KEY: &str = "shard";

/// Variables container with deep merge capability
///
/// A resolved variable context is built by layering, lowest priority first:
/// manifest defaults, caller overrides, then the injected facts
/// (`namespace` and `shard`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(pub JsonValue);

impl Variables {
    /// Create empty variables
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load variables from a YAML (or JSON) file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse variables from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Wrap a JSON value, which must be an object (or null for "nothing")
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(_) => Ok(Self(value)),
            JsonValue::Null => Ok(Self::new()),
            other => Err(CoreError::InvalidVariable {
                message: format!("variables must be a mapping, got {}", type_name(&other)),
            }),
        }
    }

    /// Build the base context for a deployment
    ///
    /// `defaults < overrides < namespace`. The shard key is injected later by
    /// the shard expander.
    pub fn layered(defaults: Variables, overrides: &Variables, namespace: &str) -> Self {
        let mut result = defaults;
        result.merge(overrides);
        result.insert(NAMESPACE_KEY, JsonValue::String(namespace.to_string()));
        result
    }

    /// Deep merge another Variables into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Variables) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Deep merge a raw JSON object over this one
    pub fn merge_value(&mut self, overlay: &JsonValue) {
        deep_merge(&mut self.0, overlay);
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(CoreError::InvalidVariable {
                message: format!("invalid variable path '{}'", path),
            });
        }
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Insert a top-level key, replacing any previous value
    pub fn insert(&mut self, key: &str, value: JsonValue) {
        if !self.0.is_object() {
            self.0 = JsonValue::Object(serde_json::Map::new());
        }
        if let JsonValue::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value);
        }
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Top-level variable names, in map order
    pub fn keys(&self) -> Vec<&str> {
        match &self.0 {
            JsonValue::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// The injected namespace, if any
    pub fn namespace(&self) -> Option<&str> {
        self.get(NAMESPACE_KEY).and_then(JsonValue::as_str)
    }

    /// The injected shard parameters (`Null` when unsharded)
    pub fn shard(&self) -> &JsonValue {
        self.get(SHARD_KEY).unwrap_or(&JsonValue::Null)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if variables are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert(key.to_string(), new_value);
        } else {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

/// Parse a scalar override value: booleans, null, numbers, inline JSON, else string
fn parse_scalar(val: &str) -> JsonValue {
    if val == "true" {
        JsonValue::Bool(true)
    } else if val == "false" {
        JsonValue::Bool(false)
    } else if val == "null" {
        JsonValue::Null
    } else if let Ok(num) = val.parse::<i64>() {
        JsonValue::Number(num.into())
    } else if let Some(num) = val
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        JsonValue::Number(num)
    } else if val.starts_with('[') || val.starts_with('{') {
        serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
    } else {
        JsonValue::String(val.to_string())
    }
}

/// Parse `-x` variable overrides
///
/// Each argument is either a JSON object (merged as is) or one or more
/// `key=value` pairs separated by commas. Keys may be dotted paths.
pub fn parse_overrides(args: &[String]) -> Result<Variables> {
    let mut variables = Variables::new();

    for arg in args {
        let trimmed = arg.trim();
        if trimmed.starts_with('{') {
            let value: JsonValue = serde_json::from_str(trimmed).map_err(|e| {
                CoreError::InvalidVariable {
                    message: format!("invalid JSON in '{}': {}", arg, e),
                }
            })?;
            variables.merge(&Variables::from_value(value)?);
            continue;
        }

        // Only split on commas when every segment is itself a pair, so values
        // such as `hosts=a,b` stay intact.
        let segments: Vec<&str> = trimmed.split(',').collect();
        let pairs = if segments.len() > 1 && segments.iter().all(|s| s.contains('=')) {
            segments
        } else {
            vec![trimmed]
        };

        for pair in pairs {
            let (key, val) = pair.split_once('=').ok_or_else(|| CoreError::InvalidVariable {
                message: format!("invalid format '{}', expected key=value or a JSON object", arg),
            })?;
            variables.set(key.trim(), parse_scalar(val))?;
        }
    }

    Ok(variables)
}
