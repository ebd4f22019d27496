//! Pull command - download a package and extract it locally

use console::style;
use std::path::Path;

use crate::commands::{Context, RegistryPackage};
use crate::display;
use crate::error::Result;
use crate::util::truncate_hash;

/// Pull a package into `directory/<namespace>_<name>_<version>`
pub async fn run(
    ctx: &Context,
    package: &RegistryPackage,
    directory: &Path,
    overwrite: bool,
) -> Result<()> {
    let reference = package.reference()?;
    let resolver = ctx.resolver()?;

    let spinner = display::spinner(format!("Pulling {}", reference));
    let resolved = resolver.resolve(&reference).await;
    spinner.finish_and_clear();
    let resolved = resolved?;

    let path = resolver.extract(&resolved, directory, overwrite)?;

    display::success(format!(
        "Pulled {} {} ({})",
        style(&resolved.name).cyan(),
        style(&resolved.version).yellow(),
        style(truncate_hash(&resolved.digest(), 19)).dim()
    ));
    println!("{}", path.display());
    Ok(())
}
