//! Exec command - run a command in the first pod of a workload

use kpm_kube::{KubeCluster, exec_in_first_pod};
use std::io::Write;

use crate::commands::Context;
use crate::error::Result;

/// Run `command` and mirror its output; a non-zero exit is passed through
pub async fn run(
    ctx: &Context,
    kind: &str,
    name: &str,
    container: Option<&str>,
    command: &[String],
) -> Result<()> {
    let cluster = KubeCluster::connect().await?;
    let output =
        exec_in_first_pod(&cluster, kind, name, ctx.namespace(), container, command).await?;

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    std::io::stdout().flush()?;

    if !output.success() {
        tracing::debug!(exit_code = output.exit_code, "remote command failed");
        std::process::exit(output.exit_code);
    }
    Ok(())
}
