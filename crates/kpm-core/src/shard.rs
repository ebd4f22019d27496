//! Shard topology and expansion into per-shard variable contexts

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::values::{SHARD_KEY, Variables};

/// How many parallel copies of the template set to render
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub enum ShardSpec {
    /// A single implicit shard; names are left untouched
    #[default]
    None,

    /// `n` shards indexed `0..n`
    Count(usize),

    /// One shard per parameter map, in order
    Explicit(Vec<Map<String, JsonValue>>),
}

impl ShardSpec {
    /// Parse the command-line form: a bare non-negative integer or a JSON
    /// array of objects
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("empty shard specification"));
        }
        let value: JsonValue = serde_json::from_str(text)
            .map_err(|e| invalid(format!("'{}' is not valid JSON: {}", text, e)))?;
        match value {
            JsonValue::Null => Err(invalid("null is not a shard specification")),
            other => Self::from_value(other),
        }
    }

    /// Interpret an already-parsed value (`null` means no shards)
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::None),
            JsonValue::Number(n) => {
                if let Some(count) = n.as_u64() {
                    usize::try_from(count)
                        .map(Self::Count)
                        .map_err(|_| invalid(format!("shard count {} is too large", count)))
                } else if n.as_i64().is_some() {
                    Err(invalid(format!("shard count must be non-negative, got {}", n)))
                } else {
                    Err(invalid(format!("shard count must be an integer, got {}", n)))
                }
            }
            JsonValue::Array(items) => {
                let mut maps = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        JsonValue::Object(map) => maps.push(map),
                        other => {
                            return Err(invalid(format!(
                                "shard #{} must be an object, got {}",
                                i, other
                            )));
                        }
                    }
                }
                Ok(Self::Explicit(maps))
            }
            JsonValue::Object(_) => Err(invalid(
                "expected a count or a list of shard objects, got a single object",
            )),
            other => Err(invalid(format!(
                "expected a count or a list of shard objects, got {}",
                other
            ))),
        }
    }

    /// Number of contexts this spec expands to
    pub fn len(&self) -> usize {
        match self {
            Self::None => 1,
            Self::Count(n) => *n,
            Self::Explicit(maps) => maps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<JsonValue> for ShardSpec {
    type Error = CoreError;

    fn try_from(value: JsonValue) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<ShardSpec> for JsonValue {
    fn from(spec: ShardSpec) -> Self {
        match spec {
            ShardSpec::None => JsonValue::Null,
            ShardSpec::Count(n) => JsonValue::from(n),
            ShardSpec::Explicit(maps) => {
                JsonValue::Array(maps.into_iter().map(JsonValue::Object).collect())
            }
        }
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidShardSpec {
        message: message.into(),
    }
}

/// Identity of one shard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    /// Position in the expansion
    pub index: usize,

    /// Suffix appended to resource names
    pub id: String,
}

/// The fully layered variables for one shard
#[derive(Debug, Clone, PartialEq)]
pub struct ShardContext {
    /// `None` for the implicit single shard
    pub shard: Option<Shard>,
    pub variables: Variables,
}

/// Expand a shard spec over the base variables
///
/// Every context carries the reserved `shard` key: `null` when unsharded,
/// `{index}` for counted shards, and the shard's own map (with `index`
/// added) for explicit shards. Explicit maps are also merged over the base
/// variables so their keys win.
pub fn expand(spec: &ShardSpec, base: &Variables) -> Result<Vec<ShardContext>> {
    let contexts = match spec {
        ShardSpec::None => {
            let mut variables = base.clone();
            variables.insert(SHARD_KEY, JsonValue::Null);
            vec![ShardContext {
                shard: None,
                variables,
            }]
        }
        ShardSpec::Count(n) => (0..*n)
            .map(|index| {
                let mut variables = base.clone();
                variables.insert(SHARD_KEY, serde_json::json!({ "index": index }));
                ShardContext {
                    shard: Some(Shard {
                        index,
                        id: index.to_string(),
                    }),
                    variables,
                }
            })
            .collect(),
        ShardSpec::Explicit(maps) => {
            let mut seen = HashSet::new();
            let mut contexts = Vec::with_capacity(maps.len());
            for (index, map) in maps.iter().enumerate() {
                let id = shard_id(index, map);
                if !seen.insert(id.clone()) {
                    return Err(invalid(format!("duplicate shard id '{}'", id)));
                }

                let mut params = map.clone();
                params
                    .entry("index")
                    .or_insert_with(|| JsonValue::from(index));

                let mut variables = base.clone();
                variables.merge_value(&JsonValue::Object(map.clone()));
                variables.insert(SHARD_KEY, JsonValue::Object(params));

                contexts.push(ShardContext {
                    shard: Some(Shard { index, id }),
                    variables,
                });
            }
            contexts
        }
    };

    tracing::debug!(shards = contexts.len(), "expanded shard specification");
    Ok(contexts)
}

fn shard_id(index: usize, map: &Map<String, JsonValue>) -> String {
    match map.get("name") {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => index.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Variables {
        Variables::from_value(json!({"namespace": "ns", "region": "eu", "replicas": 1})).unwrap()
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(ShardSpec::parse("3").unwrap(), ShardSpec::Count(3));
        assert_eq!(ShardSpec::parse(" 0 ").unwrap(), ShardSpec::Count(0));
    }

    #[test]
    fn test_parse_explicit() {
        let spec = ShardSpec::parse(r#"[{"name": "a"}, {"name": "b", "region": "us"}]"#).unwrap();
        match spec {
            ShardSpec::Explicit(maps) => {
                assert_eq!(maps.len(), 2);
                assert_eq!(maps[1]["region"], "us");
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for text in ["-1", "1.5", "[1, 2]", r#"{"name": "a"}"#, "[{", "three", "", "null"] {
            let err = ShardSpec::parse(text).unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidShardSpec { .. }),
                "{} should be rejected, got {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_expand_none() {
        let contexts = expand(&ShardSpec::None, &base()).unwrap();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].shard.is_none());
        assert_eq!(contexts[0].variables.shard(), &JsonValue::Null);
        assert_eq!(contexts[0].variables.get("region").unwrap(), "eu");
    }

    #[test]
    fn test_expand_count() {
        let contexts = expand(&ShardSpec::Count(3), &base()).unwrap();
        let ids: Vec<&str> = contexts
            .iter()
            .map(|c| c.shard.as_ref().unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
        assert_eq!(contexts[2].variables.shard(), &json!({"index": 2}));
        assert_eq!(contexts[2].variables.namespace(), Some("ns"));
    }

    #[test]
    fn test_expand_count_zero_is_empty() {
        assert!(expand(&ShardSpec::Count(0), &base()).unwrap().is_empty());
        assert!(ShardSpec::Count(0).is_empty());
    }

    #[test]
    fn test_expand_explicit_overrides_base() {
        let spec = ShardSpec::parse(r#"[{"name": "west", "region": "us"}, {"replicas": 5}]"#).unwrap();
        let contexts = expand(&spec, &base()).unwrap();

        assert_eq!(contexts[0].shard.as_ref().unwrap().id, "west");
        assert_eq!(contexts[0].variables.get("region").unwrap(), "us");
        assert_eq!(
            contexts[0].variables.shard(),
            &json!({"name": "west", "region": "us", "index": 0})
        );

        assert_eq!(contexts[1].shard.as_ref().unwrap().id, "1");
        assert_eq!(contexts[1].variables.get("replicas").unwrap(), 5);
        assert_eq!(contexts[1].variables.get("region").unwrap(), "eu");
    }

    #[test]
    fn test_expand_explicit_duplicate_ids() {
        let spec = ShardSpec::parse(r#"[{"name": "a"}, {"name": "a"}]"#).unwrap();
        let err = expand(&spec, &base()).unwrap_err();
        assert!(err.to_string().contains("duplicate shard id 'a'"));

        // A name equal to another shard's index collides too
        let spec = ShardSpec::parse(r#"[{}, {"name": "0"}]"#).unwrap();
        assert!(expand(&spec, &base()).is_err());
    }

    #[test]
    fn test_expand_is_deterministic() {
        let spec = ShardSpec::parse(r#"[{"name": 1}, {"name": 2}]"#).unwrap();
        let first = expand(&spec, &base()).unwrap();
        let second = expand(&spec, &base()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].shard.as_ref().unwrap().id, "1");
    }

    #[test]
    fn test_manifest_value_roundtrip() {
        let spec: ShardSpec = serde_yaml::from_str("- name: a\n- name: b\n").unwrap();
        assert_eq!(spec.len(), 2);
        let value = JsonValue::from(spec);
        assert_eq!(value, json!([{"name": "a"}, {"name": "b"}]));
    }
}
