//! Channel command - create, move and inspect release channels

use console::style;
use kpm_core::PackageName;
use kpm_registry::ChannelManager;
use semver::Version;

use crate::commands::Context;
use crate::display;
use crate::error::{CliError, Result};

/// What the channel flags ask for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    List,
    Show(String),
    Create(String),
    /// Add and/or remove releases on a channel, add first
    Update {
        name: String,
        add: Option<Version>,
        remove: Option<Version>,
    },
}

impl ChannelAction {
    pub fn from_flags(
        name: Option<&str>,
        create: bool,
        add: Option<&str>,
        remove: Option<&str>,
    ) -> Result<Self> {
        let require_name = |flag: &str| {
            name.map(str::to_string).ok_or_else(|| {
                CliError::validation_with_help(
                    format!("{} needs a channel name", flag),
                    "pass --name <channel>",
                )
            })
        };

        if create {
            return Ok(Self::Create(require_name("--create")?));
        }
        if add.is_some() || remove.is_some() {
            return Ok(Self::Update {
                name: require_name("--add/--remove")?,
                add: add.map(parse_version).transpose()?,
                remove: remove.map(parse_version).transpose()?,
            });
        }
        Ok(match name {
            Some(name) => Self::Show(name.to_string()),
            None => Self::List,
        })
    }
}

fn parse_version(text: &str) -> Result<Version> {
    Version::parse(text.trim_start_matches('v'))
        .map_err(|e| CliError::input(format!("invalid version '{}': {}", text, e)))
}

pub async fn run(ctx: &Context, package: &str, action: ChannelAction) -> Result<()> {
    let package = PackageName::parse(package)?;
    let channels = ChannelManager::new(ctx.registry()?);

    match action {
        ChannelAction::List => {
            let list = channels.list(&package).await?;
            if list.is_empty() {
                println!("No channels for {}", package);
            }
            for channel in &list {
                display::print_channel(channel);
            }
        }
        ChannelAction::Show(name) => {
            display::print_channel(&channels.show(&package, &name).await?);
        }
        ChannelAction::Create(name) => {
            channels.create(&package, &name).await?;
            display::success(format!(
                "Channel '{}' on '{}' created",
                style(&name).cyan(),
                package
            ));
        }
        ChannelAction::Update { name, add, remove } => {
            if let Some(version) = add {
                channels.add_release(&package, &name, &version).await?;
                display::success(format!(
                    "Release '{}' added on '{}'",
                    style(&version).yellow(),
                    name
                ));
            }
            if let Some(version) = remove {
                channels.remove_release(&package, &name, &version).await?;
                display::success(format!(
                    "Release '{}' removed from '{}'",
                    style(&version).yellow(),
                    name
                ));
            }
        }
    }
    Ok(())
}
