//! Compose per-shard renders into the full desired state

use kpm_core::{Manifest, Resource, ShardContext};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::renderer::Renderer;

/// Render every shard context and flatten the results
///
/// With more than one context each resource name (and `metadata.name` in
/// the body) gets `-{shard_id}` appended. A single context leaves names
/// untouched. Output is in shard order, then template order.
pub fn compose(
    manifest: &Manifest,
    contexts: &[ShardContext],
    renderer: &dyn Renderer,
) -> Result<Vec<Resource>> {
    let suffixed = contexts.len() > 1;
    let mut composed = Vec::with_capacity(contexts.len() * manifest.resources.len());

    for context in contexts {
        for mut resource in renderer.render(manifest, &context.variables)? {
            if let (true, Some(shard)) = (suffixed, &context.shard) {
                resource.name = format!("{}-{}", resource.name, shard.id);
                if let Some(metadata) = resource
                    .body
                    .get_mut("metadata")
                    .and_then(JsonValue::as_object_mut)
                {
                    metadata.insert("name".to_string(), JsonValue::String(resource.name.clone()));
                }
            }
            resource.shard = context.shard.clone();
            composed.push(resource);
        }
    }

    tracing::debug!(
        package = %manifest.package.name,
        renderer = %renderer.kind(),
        shards = contexts.len(),
        resources = composed.len(),
        "composed desired state"
    );

    Ok(composed)
}

/// A composed resource list with output helpers
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSet {
    pub resources: Vec<Resource>,
}

impl RenderedSet {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Pretty JSON array of the resource bodies
    pub fn to_json(&self) -> Result<String> {
        let bodies: Vec<&JsonValue> = self.resources.iter().map(|r| &r.body).collect();
        Ok(serde_json::to_string_pretty(&bodies)?)
    }

    /// Multi-document YAML of the resource bodies
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for resource in &self.resources {
            let doc = serde_yaml::to_string(&resource.body).map_err(|source| {
                crate::error::EngineError::Yaml {
                    template: resource.template.clone(),
                    source,
                }
            })?;
            out.push_str("---\n");
            out.push_str(&doc);
        }
        Ok(out)
    }

    /// `Kind/name` per resource, in order
    pub fn names(&self) -> Vec<String> {
        self.resources
            .iter()
            .map(|r| format!("{}/{}", r.kind, r.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl From<Vec<Resource>> for RenderedSet {
    fn from(resources: Vec<Resource>) -> Self {
        Self::new(resources)
    }
}
