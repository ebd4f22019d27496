//! Display formatting for CLI output
//!
//! Status lines go to stderr so command output on stdout (rendered
//! manifests, JSON listings) can be piped.

use console::{StyledObject, style};
use indicatif::{ProgressBar, ProgressStyle};
use kpm_kube::{ReconcileReport, ResourceStatus};
use kpm_registry::{Channel, PackageSummary};
use std::time::Duration;

/// `→ message` progress line
pub fn step(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("→").blue().bold(), message);
}

/// `✓ message` success line
pub fn success(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// `⚠ message` warning line
pub fn warning(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("⚠").yellow(), message);
}

/// Spinner on stderr; hidden when stderr is not a terminal
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(template);
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn status_style(status: ResourceStatus) -> StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        ResourceStatus::Created | ResourceStatus::Updated | ResourceStatus::Recreated => {
            style(text).green()
        }
        ResourceStatus::Deleted => style(text).yellow(),
        ResourceStatus::Conflict | ResourceStatus::Failed => style(text).red().bold(),
        ResourceStatus::Planned => style(text).cyan(),
        ResourceStatus::Absent | ResourceStatus::Cancelled => style(text).dim(),
    }
}

/// One line per resource, then the summary
pub fn print_report(report: &ReconcileReport) {
    for line in &report.resources {
        let shard = line
            .shard
            .as_ref()
            .map(|s| format!(" [shard {}]", s.id))
            .unwrap_or_default();
        let retries = if line.attempts > 1 {
            format!(" ({} attempts)", line.attempts)
        } else {
            String::new()
        };
        eprintln!(
            "  {:<10} {}{}{}",
            status_style(line.status),
            line.key,
            style(shard).dim(),
            style(retries).dim()
        );
        if let Some(error) = &line.error {
            eprintln!("             {}", style(error).red());
        }
    }

    let summary = report.summary();
    if report.is_success() {
        success(summary);
    } else {
        eprintln!("{} {}", style("✗").red().bold(), summary);
    }
}

/// Table of registry packages
pub fn print_packages(packages: &[PackageSummary]) {
    println!(
        "{:<40} {:<12} {:<8} {}",
        style("NAME").bold(),
        style("DEFAULT").bold(),
        style("VERSIONS").bold(),
        style("CHANNELS").bold()
    );
    for package in packages {
        let default = package
            .default
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:<12} {:<8} {}",
            package.name.to_string(),
            default,
            package.versions.len(),
            package.channels.join(", ")
        );
    }
}

/// A channel with its release history, current release last
pub fn print_channel(channel: &Channel) {
    let current = channel
        .current()
        .map(|v| style(v.to_string()).green().to_string())
        .unwrap_or_else(|| style("<empty>".to_string()).dim().to_string());
    println!(
        "{} {} {}",
        style(format!("{}:{}", channel.package, channel.name)).cyan().bold(),
        style("→").dim(),
        current
    );
    for release in &channel.releases {
        println!(
            "  {:<12} {}",
            release.version.to_string(),
            style(release.created_at.format("%Y-%m-%d %H:%M:%S").to_string()).dim()
        );
    }
}
