//! The renderer seam: manifest + variables in, ordered resources out

use kpm_core::{Manifest, Resource, ResourceTemplate, Variables};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::expression::ExpressionRenderer;
use crate::plain::PlainRenderer;

/// Namespace used when neither the document nor the context name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Turns a manifest's templates into resources for one variable context
///
/// Implementations are pure: the same `(manifest, variables)` always yields
/// the same resources, in template declaration order.
pub trait Renderer: Send + Sync {
    fn render(&self, manifest: &Manifest, variables: &Variables) -> Result<Vec<Resource>>;

    fn kind(&self) -> RendererKind;
}

/// Which renderer to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RendererKind {
    /// `${name}` substitution in YAML documents
    #[default]
    Plain,
    /// MiniJinja programs over `params`
    Expression,
}

impl RendererKind {
    pub fn build(self) -> Box<dyn Renderer> {
        match self {
            Self::Plain => Box::new(PlainRenderer::new()),
            Self::Expression => Box::new(ExpressionRenderer::new()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Expression => "expression",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "expression" | "jinja" => Ok(Self::Expression),
            other => Err(format!(
                "unknown renderer '{}', expected 'plain' or 'expression'",
                other
            )),
        }
    }
}

/// Turn a rendered document into a resource
///
/// Returns `None` for an empty document. Missing `kind`, `apiVersion` and
/// `metadata.name` are filled in from the template's hint, `v1` and the
/// template name so that the body can be applied as is.
pub(crate) fn into_resource(
    template: &ResourceTemplate,
    body: JsonValue,
    variables: &Variables,
) -> Result<Option<Resource>> {
    let mut body = match body {
        JsonValue::Null => return Ok(None),
        JsonValue::Object(map) if map.is_empty() => return Ok(None),
        JsonValue::Object(map) => map,
        other => {
            return Err(EngineError::InvalidResource {
                template: template.name.clone(),
                message: format!("expected a mapping, got {}", type_name(&other)),
            });
        }
    };

    let kind = match string_field(&body, "kind", template)? {
        Some(kind) => kind,
        None => {
            let hint = template
                .kind
                .clone()
                .ok_or_else(|| EngineError::InvalidResource {
                    template: template.name.clone(),
                    message: "document has no `kind` and the template declares none".to_string(),
                })?;
            body.insert("kind".to_string(), JsonValue::String(hint.clone()));
            hint
        }
    };

    let api_version = match string_field(&body, "apiVersion", template)? {
        Some(v) => v,
        None => {
            body.insert("apiVersion".to_string(), JsonValue::String("v1".to_string()));
            "v1".to_string()
        }
    };

    let metadata = body
        .entry("metadata")
        .or_insert_with(|| JsonValue::Object(Map::new()));
    let metadata = metadata
        .as_object_mut()
        .ok_or_else(|| EngineError::InvalidResource {
            template: template.name.clone(),
            message: "`metadata` must be a mapping".to_string(),
        })?;

    let name = match string_field(metadata, "name", template)? {
        Some(name) => name,
        None => {
            metadata.insert("name".to_string(), JsonValue::String(template.name.clone()));
            template.name.clone()
        }
    };

    let namespace = string_field(metadata, "namespace", template)?
        .or_else(|| variables.namespace().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    Ok(Some(Resource {
        api_version,
        kind,
        name,
        namespace: Some(namespace),
        body: JsonValue::Object(body),
        template: template.name.clone(),
        shard: None,
    }))
}

/// A string field; absent or null is `None`, any other type is an error
fn string_field(
    map: &Map<String, JsonValue>,
    key: &str,
    template: &ResourceTemplate,
) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(EngineError::InvalidResource {
            template: template.name.clone(),
            message: format!("`{}` must be a string, got {}", key, type_name(other)),
        }),
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
