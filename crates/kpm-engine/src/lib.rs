//! kpm Engine - rendering packages into Kubernetes resources
//!
//! This crate provides:
//! - `PlainRenderer`: YAML templates with `${name}` placeholders
//! - `ExpressionRenderer`: MiniJinja templates with Kubernetes filters
//! - `compose`: per-shard rendering flattened into the desired state
//! - Human-readable error messages with suggestions

pub mod composer;
pub mod error;
pub mod expression;
pub mod filters;
pub mod plain;
pub mod renderer;
pub mod suggestions;

pub use composer::{RenderedSet, compose};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use expression::ExpressionRenderer;
pub use plain::PlainRenderer;
pub use renderer::{Renderer, RendererKind};
pub use suggestions::AVAILABLE_FILTERS;
