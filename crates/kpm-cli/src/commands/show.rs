//! Show command - inspect a registry package without extracting it

use console::style;
use kpm_core::archive;
use kpm_core::package::MANIFEST_FILE;

use crate::commands::{Context, RegistryPackage};
use crate::error::{CliError, Result};
use crate::util::format_size;

/// Print the manifest, the file tree (`tree`) or one file (`file`)
pub async fn run(
    ctx: &Context,
    package: &RegistryPackage,
    tree: bool,
    file: Option<&str>,
) -> Result<()> {
    let reference = package.reference()?;
    let resolved = ctx.resolver()?.resolve(&reference).await?;

    if tree {
        for entry in archive::list_entries(&resolved.blob)? {
            if entry.is_dir {
                println!("{}/", style(&entry.path).blue());
            } else {
                println!(
                    "{:<50} {}",
                    entry.path,
                    style(format_size(entry.size)).dim()
                );
            }
        }
        return Ok(());
    }

    let (path, content) = match file {
        Some(path) => (path, archive::read_file(&resolved.blob, path)?),
        None => (MANIFEST_FILE, archive::read_file(&resolved.blob, MANIFEST_FILE)?),
    };
    let text = String::from_utf8(content)
        .map_err(|_| CliError::input(format!("{} is not a text file", path)))?;

    eprintln!(
        "{} {} {}",
        style(format!("# {}", resolved.name)).dim(),
        style(&resolved.version).dim(),
        style(resolved.digest()).dim()
    );
    print!("{}", text);
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}
