//! Delete-package command - remove a package (or one version) from the registry

use console::style;
use kpm_core::PackageName;
use kpm_registry::Registry;
use semver::Version;

use crate::commands::Context;
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, package: &str, version: Option<&str>) -> Result<()> {
    let name = PackageName::parse(package)?;
    let version = version
        .map(|v| Version::parse(v.trim_start_matches('v')))
        .transpose()
        .map_err(|e| CliError::input(format!("invalid version: {}", e)))?;

    ctx.registry()?
        .delete_package(&name, version.as_ref())
        .await?;

    match version {
        Some(version) => display::success(format!(
            "Package {} {} deleted",
            style(&name).cyan(),
            style(version).yellow()
        )),
        None => display::success(format!("Package {} deleted", style(&name).cyan())),
    }
    Ok(())
}
