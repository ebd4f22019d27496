//! Version command - client and registry API versions

use kpm_registry::Registry;

use crate::commands::Context;
use crate::error::Result;

pub async fn run(ctx: &Context) -> Result<()> {
    let api = ctx.registry()?.api_version().await?;
    println!("Api-version: {}", api);
    println!("Client-version: {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
