//! Channel management on top of a registry

use kpm_core::PackageName;
use semver::Version;
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::registry::{Channel, Registry};

/// Create, inspect and move channels
///
/// Adding a release that is already on the channel and removing one that is
/// not are successful no-ops; the registry is not written in either case.
pub struct ChannelManager {
    registry: Arc<dyn Registry>,
}

impl ChannelManager {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Create an empty channel; an existing one is a `Conflict`
    pub async fn create(&self, package: &PackageName, name: &str) -> Result<Channel> {
        let channel = self.registry.create_channel(package, name).await?;
        tracing::info!(package = %package, channel = name, "created channel");
        Ok(channel)
    }

    pub async fn add_release(
        &self,
        package: &PackageName,
        name: &str,
        version: &Version,
    ) -> Result<Channel> {
        let channel = self.registry.show_channel(package, name).await?;
        if channel.contains(version) {
            tracing::debug!(package = %package, channel = name, %version, "release already present");
            return Ok(channel);
        }

        match self.registry.add_channel_release(package, name, version).await {
            Ok(channel) => {
                tracing::info!(package = %package, channel = name, %version, "added release");
                Ok(channel)
            }
            Err(e @ RegistryError::Conflict { .. }) => {
                self.settle(package, name, e, |channel| channel.contains(version))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn remove_release(
        &self,
        package: &PackageName,
        name: &str,
        version: &Version,
    ) -> Result<Channel> {
        let channel = self.registry.show_channel(package, name).await?;
        if !channel.contains(version) {
            tracing::debug!(package = %package, channel = name, %version, "release not present");
            return Ok(channel);
        }

        match self.registry.remove_channel_release(package, name, version).await {
            Ok(channel) => {
                tracing::info!(package = %package, channel = name, %version, "removed release");
                Ok(channel)
            }
            Err(e @ RegistryError::NotFound { .. }) => {
                self.settle(package, name, e, |channel| !channel.contains(version))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// A write lost a race with another client: accept the channel if it
    /// already ended up in the wanted state, otherwise keep the error
    async fn settle(
        &self,
        package: &PackageName,
        name: &str,
        error: RegistryError,
        done: impl Fn(&Channel) -> bool,
    ) -> Result<Channel> {
        match self.registry.show_channel(package, name).await {
            Ok(channel) if done(&channel) => {
                tracing::debug!(package = %package, channel = name, "channel changed concurrently");
                Ok(channel)
            }
            _ => Err(error),
        }
    }

    pub async fn show(&self, package: &PackageName, name: &str) -> Result<Channel> {
        self.registry.show_channel(package, name).await
    }

    pub async fn list(&self, package: &PackageName) -> Result<Vec<Channel>> {
        self.registry.list_channels(package).await
    }
}
