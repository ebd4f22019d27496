//! Expression renderer: MiniJinja templates evaluated against `params`
//!
//! Templates see a single input object:
//!
//! ```text
//! params:
//!   variables: { ...the full variable context... }
//!   shard: null | { index: 0, ... }
//!   namespace: "ns"
//! ```
//!
//! Undefined values are errors (strict mode); the rendered text must be a
//! single YAML document.

use kpm_core::{Manifest, Resource, Variables};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::{Value as JsonValue, json};

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::plain::is_blank;
use crate::renderer::{Renderer, RendererKind, into_resource};

#[derive(Debug, Clone, Default)]
pub struct ExpressionRenderer;

impl ExpressionRenderer {
    pub fn new() -> Self {
        Self
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        // Source excerpts in errors feed the suggestions
        env.set_debug(true);
        filters::register(&mut env);
        env
    }

    /// The evaluator input for one variable context
    pub fn params(variables: &Variables) -> JsonValue {
        json!({
            "params": {
                "variables": variables.inner(),
                "shard": variables.shard(),
                "namespace": variables.namespace(),
            }
        })
    }
}

impl Renderer for ExpressionRenderer {
    fn render(&self, manifest: &Manifest, variables: &Variables) -> Result<Vec<Resource>> {
        let mut env = self.environment();
        for template in &manifest.resources {
            env.add_template_owned(template.file.clone(), template.source.clone())
                .map_err(|e| {
                    TemplateError::from_minijinja(e, &template.file, &template.source, None)
                })?;
        }

        let input = Self::params(variables);
        let ctx = minijinja::Value::from_serialize(&input);
        let mut resources = Vec::with_capacity(manifest.resources.len());

        for template in &manifest.resources {
            let rendered = env
                .get_template(&template.file)
                .and_then(|tmpl| tmpl.render(&ctx))
                .map_err(|e| {
                    TemplateError::from_minijinja(e, &template.file, &template.source, Some(&input))
                })?;

            if is_blank(&rendered) {
                tracing::debug!(template = %template.name, "template rendered nothing, skipping");
                continue;
            }

            let body: JsonValue = serde_yaml::from_str(&rendered)
                .map_err(|e| EngineError::from(TemplateError::yaml(e, &template.file, &rendered)))?;

            if let Some(resource) = into_resource(template, body, variables)? {
                resources.push(resource);
            }
        }

        Ok(resources)
    }

    fn kind(&self) -> RendererKind {
        RendererKind::Expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateErrorKind;

    fn manifest(source: &str) -> Manifest {
        let mut m = Manifest::from_yaml(
            "package: {name: acme/web, version: 1.0.0}\nvariables:\n  image: nginx\n  replicas: 2\nresources:\n  - {name: web, file: web.yaml.j2}\n",
        )
        .unwrap();
        m.resources[0].source = source.to_string();
        m
    }

    fn vars(m: &Manifest) -> Variables {
        let mut v = Variables::layered(m.defaults(), &Variables::new(), "ns");
        v.insert("shard", json!({"index": 1}));
        v
    }

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web-{{ params.shard.index }}
  namespace: {{ params.namespace }}
spec:
  replicas: {{ params.variables.replicas }}
  template:
    metadata:
      labels: {{ {"app": "web"} | tojson }}
    spec:
      containers:
        - name: web
          image: {{ params.variables.image | quote }}
"#;

    #[test]
    fn test_render_expression_template() {
        let m = manifest(DEPLOYMENT);
        let resources = ExpressionRenderer::new().render(&m, &vars(&m)).unwrap();

        assert_eq!(resources.len(), 1);
        let r = &resources[0];
        assert_eq!(r.name, "web-1");
        assert_eq!(r.namespace.as_deref(), Some("ns"));
        assert_eq!(r.body["spec"]["replicas"], json!(2));
        assert_eq!(r.body["spec"]["template"]["metadata"]["labels"]["app"], "web");
        insta::assert_snapshot!(
            r.body["spec"]["template"]["spec"]["containers"][0]["image"].as_str().unwrap(),
            @"nginx"
        );
    }

    #[test]
    fn test_strict_undefined() {
        let m = manifest("kind: Pod\nmetadata:\n  name: {{ params.variables.imag }}\n");
        let err = ExpressionRenderer::new().render(&m, &vars(&m)).unwrap_err();

        match err {
            EngineError::Template(t) => {
                assert_eq!(t.kind(), TemplateErrorKind::UndefinedVariable);
                assert!(t.suggestion.unwrap_or_default().contains("image"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error() {
        let m = manifest("kind: Pod\nname: {{ params.variables.image \n");
        let err = ExpressionRenderer::new().render(&m, &vars(&m)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Template(ref t) if t.kind() == TemplateErrorKind::SyntaxError
        ));
    }

    #[test]
    fn test_conditional_resource_skipped() {
        let m = manifest("{% if params.variables.replicas > 5 %}kind: HorizontalPodAutoscaler{% endif %}\n");
        let resources = ExpressionRenderer::new().render(&m, &vars(&m)).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_invalid_yaml_output() {
        let m = manifest("kind: Pod\nmetadata: {{ '{' }}\n");
        let err = ExpressionRenderer::new().render(&m, &vars(&m)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Template(ref t) if t.kind() == TemplateErrorKind::YamlParseError
        ));
    }

    #[test]
    fn test_unsharded_shard_is_null() {
        let m = manifest("kind: Pod\nmetadata:\n  name: {{ 'single' if params.shard is none else 'sharded' }}\n");
        let mut v = vars(&m);
        v.insert("shard", JsonValue::Null);
        let resources = ExpressionRenderer::new().render(&m, &v).unwrap();
        assert_eq!(resources[0].name, "single");
    }
}
