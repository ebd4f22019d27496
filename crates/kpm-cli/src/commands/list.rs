//! List command - list packages in the registry

use kpm_registry::{PackageFilter, Registry};

use crate::commands::Context;
use crate::display;
use crate::error::Result;

pub async fn run(
    ctx: &Context,
    user: Option<&str>,
    organization: Option<&str>,
    output_json: bool,
) -> Result<()> {
    let filter = PackageFilter {
        user: user.map(str::to_string),
        organization: organization.map(str::to_string),
    };
    let packages = ctx.registry()?.list_packages(&filter).await?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&packages)?);
        return Ok(());
    }

    if packages.is_empty() {
        println!("No packages found in {}", ctx.config.registry);
        return Ok(());
    }

    display::print_packages(&packages);
    Ok(())
}
