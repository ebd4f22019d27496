//! Plain renderer: YAML documents with `${name}` placeholders
//!
//! Each template is parsed as YAML first, then every string (values and
//! mapping keys) has its placeholders substituted, so interpolated values
//! can never break the document structure.
//!
//! - `${a.b.c}` looks up a dotted path in the variable context
//! - a string that is exactly one placeholder keeps the variable's JSON type
//! - `$${x}` renders as the literal text `${x}`

use kpm_core::{Manifest, Resource, ResourceTemplate, Variables};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};

use crate::error::{EngineError, Result};
use crate::renderer::{Renderer, RendererKind, into_resource};
use crate::suggestions::{suggest_undefined_variable, variable_paths};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$\{|\$\{([A-Za-z0-9_.\-]+)\}").expect("valid placeholder regex")
});
static WHOLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{([A-Za-z0-9_.\-]+)\}$").expect("valid placeholder regex"));

#[derive(Debug, Clone, Default)]
pub struct PlainRenderer;

impl PlainRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for PlainRenderer {
    fn render(&self, manifest: &Manifest, variables: &Variables) -> Result<Vec<Resource>> {
        let defaults = manifest.defaults();
        let mut resources = Vec::with_capacity(manifest.resources.len());

        for template in &manifest.resources {
            let scope = Scope {
                template,
                variables,
                defaults: &defaults,
            };

            if is_blank(&template.source) {
                tracing::debug!(template = %template.name, "skipping empty document");
                continue;
            }
            let document: JsonValue =
                serde_yaml::from_str(&template.source).map_err(|source| EngineError::Yaml {
                    template: template.name.clone(),
                    source,
                })?;
            let body = scope.substitute(document)?;

            match into_resource(template, body, variables)? {
                Some(resource) => resources.push(resource),
                None => tracing::debug!(template = %template.name, "skipping empty document"),
            }
        }

        Ok(resources)
    }

    fn kind(&self) -> RendererKind {
        RendererKind::Plain
    }
}

/// Only comments, blank lines and document markers
pub(crate) fn is_blank(source: &str) -> bool {
    source.lines().map(str::trim).all(|line| {
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}

struct Scope<'a> {
    template: &'a ResourceTemplate,
    variables: &'a Variables,
    defaults: &'a Variables,
}

impl Scope<'_> {
    fn substitute(&self, value: JsonValue) -> Result<JsonValue> {
        match value {
            JsonValue::String(s) => self.substitute_str(&s),
            JsonValue::Array(items) => items
                .into_iter()
                .map(|item| self.substitute(item))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array),
            JsonValue::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    let key = match self.substitute_str(&key)? {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    };
                    out.insert(key, self.substitute(child)?);
                }
                Ok(JsonValue::Object(out))
            }
            scalar => Ok(scalar),
        }
    }

    fn substitute_str(&self, s: &str) -> Result<JsonValue> {
        if let Some(caps) = WHOLE_RE.captures(s) {
            return self.lookup(&caps[1]).cloned();
        }
        if !s.contains("${") {
            return Ok(JsonValue::String(s.to_string()));
        }

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(s) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&s[last..whole.start()]);
            out.push_str(&self.expand(&caps)?);
            last = whole.end();
        }
        out.push_str(&s[last..]);
        Ok(JsonValue::String(out))
    }

    fn expand(&self, caps: &Captures<'_>) -> Result<String> {
        match caps.get(1) {
            // `$${` escape
            None => Ok("${".to_string()),
            Some(name) => Ok(match self.lookup(name.as_str())? {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }

    fn lookup(&self, name: &str) -> Result<&JsonValue> {
        let found = self
            .variables
            .get(name)
            .filter(|v| !v.is_null())
            .or_else(|| self.defaults.get(name).filter(|v| !v.is_null()));

        found.ok_or_else(|| {
            let available = variable_paths(self.variables.inner());
            EngineError::UndefinedVariable {
                name: name.to_string(),
                template: self.template.name.clone(),
                suggestion: suggest_undefined_variable(name, &available),
            }
        })
    }
}
