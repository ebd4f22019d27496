//! Deploy and remove commands - reconcile a package against the cluster

use console::style;
use kpm_kube::{CancelToken, DeployMode, Deployer, Deployment, Source};

use crate::commands::{Context, RenderArgs};
use crate::display;
use crate::error::{CliError, Result};

/// Pick the reconcile mode from the deploy flags
pub fn install_mode(force: bool, dry_run: bool) -> DeployMode {
    match (dry_run, force) {
        (true, _) => DeployMode::DryRun,
        (false, true) => DeployMode::ForceInstall,
        (false, false) => DeployMode::Install,
    }
}

pub fn remove_mode(dry_run: bool) -> DeployMode {
    if dry_run {
        DeployMode::DryRun
    } else {
        DeployMode::Remove
    }
}

/// Run the deploy pipeline in `mode`
pub async fn run(
    ctx: &Context,
    args: &RenderArgs,
    mode: DeployMode,
    parallel_shards: bool,
) -> Result<()> {
    let request = args.request(ctx.namespace(), mode)?;

    let mut deployer = Deployer::new();
    if let Source::Registry(reference) = &request.source {
        display::step(format!(
            "Resolving {} from {}",
            style(reference).cyan(),
            ctx.config.registry
        ));
        deployer = deployer.with_resolver(ctx.resolver()?);
    }
    if !mode.is_dry_run() {
        deployer = deployer.with_reconciler(ctx.reconciler(parallel_shards).await?);
    }

    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                display::warning("Interrupted, finishing in-flight operations");
                cancel.cancel();
            }
        })
    };

    let spinner = display::spinner(format!("{} in namespace {}", mode, request.namespace));
    let outcome = deployer.run(&request, &cancel).await;
    spinner.finish_and_clear();
    watcher.abort();

    let deployment = outcome?;
    print_header(&deployment, mode, &request.namespace);
    display::print_report(&deployment.report);

    if deployment.report.is_success() {
        Ok(())
    } else {
        Err(CliError::reconcile(&deployment.report))
    }
}

fn print_header(deployment: &Deployment, mode: DeployMode, namespace: &str) {
    let plan = &deployment.plan;
    let shards = if plan.shards > 1 {
        format!(", {} shards", plan.shards)
    } else {
        String::new()
    };
    display::step(format!(
        "{} {} {} into namespace {} ({} renderer{})",
        mode,
        style(&plan.package.name).cyan(),
        style(&plan.package.version).yellow(),
        style(namespace).yellow(),
        plan.renderer,
        shards
    ));
    if let Some(path) = &plan.extracted_to {
        display::step(format!("Extracted to {}", path.display()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_from_flags() {
        assert_eq!(install_mode(false, false), DeployMode::Install);
        assert_eq!(install_mode(true, false), DeployMode::ForceInstall);
        assert_eq!(install_mode(true, true), DeployMode::DryRun);
        assert_eq!(remove_mode(false), DeployMode::Remove);
        assert_eq!(remove_mode(true), DeployMode::DryRun);
    }
}
