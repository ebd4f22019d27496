//! Generate command - render the desired state without touching a cluster

use clap::ValueEnum;
use kpm_kube::{DeployMode, Deployer, Source};

use crate::commands::{Context, RenderArgs};
use crate::error::Result;

/// Output format for rendered resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// A JSON array of resource bodies
    #[default]
    Json,
    /// A multi-document YAML stream
    Yaml,
}

pub async fn run(ctx: &Context, args: &RenderArgs, format: OutputFormat) -> Result<()> {
    let request = args.request(ctx.namespace(), DeployMode::DryRun)?;

    let mut deployer = Deployer::new();
    if matches!(request.source, Source::Registry(_)) {
        deployer = deployer.with_resolver(ctx.resolver()?);
    }

    let plan = deployer.plan(&request).await?;
    tracing::debug!(
        package = %plan.package.name,
        resources = plan.resources.len(),
        "generated resources"
    );

    let rendered = plan.rendered();
    let output = match format {
        OutputFormat::Json => rendered.to_json()?,
        OutputFormat::Yaml => rendered.to_yaml()?,
    };
    println!("{}", output.trim_end());
    Ok(())
}
