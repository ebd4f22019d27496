//! Engine error types with source-aware diagnostics

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::suggestions::{
    SuggestionCategory, extract_variable_name, find_closest_matches, suggest_context_root,
    suggest_unknown_filter,
};

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum EngineError {
    /// Expression template failed to compile or evaluate
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    /// A `${...}` placeholder has no value and no default
    #[error("Undefined variable `{name}` in template '{template}'")]
    #[diagnostic(code(kpm::render::undefined_variable))]
    UndefinedVariable {
        name: String,
        template: String,
        #[help]
        suggestion: Option<String>,
    },

    /// The rendered document cannot be turned into a resource
    #[error("Template '{template}' rendered an invalid resource: {message}")]
    #[diagnostic(code(kpm::render::invalid_resource))]
    InvalidResource { template: String, message: String },

    #[error("Failed to parse template '{template}' as YAML: {source}")]
    #[diagnostic(code(kpm::render::yaml))]
    Yaml {
        template: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] kpm_core::CoreError),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    SyntaxError,
    TypeError,
    InvalidOperation,
    YamlParseError,
    Other,
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(kpm::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    ///
    /// `params` is the input object the template was evaluated against; it
    /// is used to suggest close variable names.
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
        params: Option<&serde_json::Value>,
    ) -> Self {
        let (kind, message) = categorize_minijinja_error(&err);
        let span = err
            .line()
            .and_then(|line| calculate_span(template_source, line));
        let suggestion = generate_suggestion(&err, kind, params);

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Rendered text that is not a YAML document
    pub fn yaml(err: serde_yaml::Error, template_name: &str, rendered: &str) -> Self {
        let span = err
            .location()
            .and_then(|loc| calculate_span(rendered, loc.line()));
        Self {
            message: format!("rendered output is not valid YAML: {}", err),
            kind: TemplateErrorKind::YamlParseError,
            src: NamedSource::new(format!("{} (rendered)", template_name), rendered.to_string()),
            span,
            suggestion: Some(
                "Check indentation of interpolated blocks; `nindent` helps with nested YAML"
                    .to_string(),
            ),
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Categorize a MiniJinja error into our error kinds
fn categorize_minijinja_error(err: &minijinja::Error) -> (TemplateErrorKind, String) {
    let msg = err.to_string();
    let detailed = format!("{:#}", err);

    let kind = match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => {
            let lower = msg.to_lowercase();
            if lower.contains("undefined") {
                TemplateErrorKind::UndefinedVariable
            } else if lower.contains("syntax") {
                TemplateErrorKind::SyntaxError
            } else {
                TemplateErrorKind::Other
            }
        }
    };

    let message = match kind {
        TemplateErrorKind::UndefinedVariable => match extract_expression_from_display(&detailed) {
            Some(expr) => format!("undefined variable `{}`", expr),
            None => msg.replace("undefined value", "undefined variable"),
        },
        _ => msg
            .replace("invalid operation: ", "")
            .replace("syntax error: ", ""),
    };

    (kind, message)
}

/// Extract the problematic expression from MiniJinja's detailed display
///
/// The error line is marked with `>`:
///
/// ```text
///    8 >   image: {{ params.variables.imag }}
///      i            ^^^^^^^^^^^^^^^^^^^^^^ undefined value
/// ```
fn extract_expression_from_display(display: &str) -> Option<String> {
    for line in display.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.contains(" > ") || trimmed.starts_with("> ")) {
            continue;
        }
        if let Some(start) = line.find("{{") {
            if let Some(end) = line[start..].find("}}") {
                let expr = line[start + 2..start + end].trim();
                let head = expr.split('|').next().unwrap_or(expr).trim();
                if !head.is_empty() {
                    return Some(head.to_string());
                }
            }
        }
    }
    None
}

/// Calculate the source span for a given 1-based line number
pub(crate) fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (i, line) in source.lines().enumerate() {
        if i + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}

fn generate_suggestion(
    err: &minijinja::Error,
    kind: TemplateErrorKind,
    params: Option<&serde_json::Value>,
) -> Option<String> {
    let msg = err.to_string();
    let detailed = format!("{:#}", err);

    match kind {
        TemplateErrorKind::UndefinedVariable => {
            let expr = extract_expression_from_display(&detailed)
                .or_else(|| extract_variable_name(&msg))?;

            // Walk `params.variables.a.b` until the path breaks
            let parts: Vec<&str> = expr.split('.').collect();
            if let Some(root) = params {
                let mut current = root;
                let mut walked = Vec::new();
                for part in &parts {
                    match current.get(part) {
                        Some(next) => {
                            walked.push(*part);
                            current = next;
                        }
                        None => {
                            let available: Vec<&str> = current
                                .as_object()
                                .map(|obj| obj.keys().map(String::as_str).collect())
                                .unwrap_or_default();
                            let matches = find_closest_matches(
                                part,
                                &available,
                                3,
                                SuggestionCategory::Property,
                            );
                            let prefix = walked.join(".");
                            if let Some(best) = matches.first() {
                                return Some(format!(
                                    "Did you mean `{}.{}`? Available: {}",
                                    prefix,
                                    best.text,
                                    available.join(", ")
                                ));
                            }
                            if !available.is_empty() {
                                return Some(format!(
                                    "Key `{}` not found in `{}`. Available keys: {}",
                                    part,
                                    prefix,
                                    available.join(", ")
                                ));
                            }
                            break;
                        }
                    }
                }
            }

            suggest_context_root(&expr).or_else(|| {
                Some(format!(
                    "Variable `{}` is not defined. Variables live under `params.variables`; use `| default(...)` for optional ones.",
                    expr
                ))
            })
        }
        TemplateErrorKind::UnknownFilter => {
            let name = extract_variable_name(&msg).unwrap_or_default();
            suggest_unknown_filter(&name)
        }
        TemplateErrorKind::SyntaxError => Some(
            "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements".to_string(),
        ),
        _ => None,
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_err(source: &str, params: serde_json::Value) -> TemplateError {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        let err = env
            .render_str(source, minijinja::context! { params => &params })
            .unwrap_err();
        TemplateError::from_minijinja(err, "web.yaml", source, Some(&json!({ "params": params })))
    }

    #[test]
    fn test_undefined_variable_suggests_close_key() {
        let params = json!({"variables": {"image": "nginx", "replicas": 2}});
        let err = render_err("image: {{ params.variables.imag }}", params);

        assert_eq!(err.kind(), TemplateErrorKind::UndefinedVariable);
        let help = err.suggestion.unwrap();
        assert!(help.contains("params.variables.image"), "{}", help);
    }

    #[test]
    fn test_calculate_span() {
        let source = "line1\nline2\nline3";
        let span = calculate_span(source, 2).unwrap();
        assert_eq!(span.offset(), 6);
        assert_eq!(span.len(), 5);
        assert!(calculate_span(source, 10).is_none());
    }
}
