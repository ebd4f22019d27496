//! Push command - pack a local package and publish it

use console::style;
use kpm_core::Package;
use kpm_registry::Registry;
use std::path::Path;

use crate::commands::Context;
use crate::display;
use crate::error::Result;
use crate::util::{format_size, truncate_hash};

/// Pack `dir` and push it under the name and version from its manifest
pub async fn run(ctx: &Context, dir: &Path, force: bool) -> Result<()> {
    let package = Package::from_dir(dir)?;
    let registry = ctx.registry()?;

    display::step(format!(
        "Pushing {} {} ({}) to {}",
        style(&package.name).cyan(),
        style(&package.version).yellow(),
        format_size(package.blob.len() as u64),
        registry.endpoint()
    ));

    registry
        .push(&package.name, &package.version, &package.blob, force)
        .await?;

    display::success(format!(
        "package: {} ({}) pushed [{}]",
        package.name,
        package.version,
        truncate_hash(&package.digest(), 19)
    ));
    Ok(())
}
