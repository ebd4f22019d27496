//! Render command - render one template file outside any package

use kpm_core::{Manifest, ShardSpec, Variables, expand, parse_overrides};
use kpm_engine::{RenderedSet, RendererKind, compose};
use std::path::{Path, PathBuf};

use crate::commands::Context;
use crate::commands::generate::OutputFormat;
use crate::error::Result;

/// What to render and with which variables
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub variables: Vec<String>,
    pub variables_files: Vec<PathBuf>,
    pub shards: Option<String>,
    pub expression: bool,
    pub format: OutputFormat,
}

pub fn run(ctx: &Context, file: &Path, options: &RenderOptions) -> Result<()> {
    let source = std::fs::read_to_string(file)?;
    let manifest = Manifest::standalone(&file.to_string_lossy(), source)?;

    let mut overrides = Variables::new();
    for path in &options.variables_files {
        overrides.merge(&Variables::from_file(path)?);
    }
    overrides.merge(&parse_overrides(&options.variables)?);
    let base = Variables::layered(Variables::new(), &overrides, ctx.namespace());

    let spec = match &options.shards {
        Some(text) => ShardSpec::parse(text)?,
        None => ShardSpec::default(),
    };
    let contexts = expand(&spec, &base)?;

    let kind = if options.expression {
        RendererKind::Expression
    } else {
        RendererKind::Plain
    };
    let renderer = kind.build();
    let rendered = RenderedSet::new(compose(&manifest, &contexts, renderer.as_ref())?);

    let output = match options.format {
        OutputFormat::Json => rendered.to_json()?,
        OutputFormat::Yaml => rendered.to_yaml()?,
    };
    println!("{}", output.trim_end());
    Ok(())
}
