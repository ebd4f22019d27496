//! The registry collaborator trait and its wire types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kpm_core::PackageName;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One release in a channel's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRelease {
    pub version: Version,
    pub created_at: DateTime<Utc>,
}

/// A mutable, named pointer to a package version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub package: PackageName,

    /// Release history, oldest first; no version appears twice
    #[serde(default)]
    pub releases: Vec<ChannelRelease>,
}

impl Channel {
    pub fn new(package: PackageName, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package,
            releases: Vec::new(),
        }
    }

    /// The most recent release
    pub fn current(&self) -> Option<&Version> {
        self.releases.last().map(|r| &r.version)
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.releases.iter().any(|r| &r.version == version)
    }
}

/// Registry listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: PackageName,

    /// Version served when none is requested
    #[serde(default)]
    pub default: Option<Version>,

    /// Every published version
    #[serde(default)]
    pub versions: Vec<Version>,

    #[serde(default)]
    pub channels: Vec<String>,
}

/// Filter for `list_packages`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageFilter {
    pub user: Option<String>,
    pub organization: Option<String>,
}

/// Where packages and channels live
///
/// Implementations map their own failure modes onto [`RegistryError`]:
/// absent package/version/channel is `NotFound`, an existing channel or an
/// already published version (without force) is `Conflict`.
///
/// [`RegistryError`]: crate::RegistryError
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registry endpoint, for messages
    fn endpoint(&self) -> &str;

    /// Version of the API the registry serves
    async fn api_version(&self) -> Result<String>;

    /// Raw package blob; `None` asks for the registry's default version
    async fn fetch(&self, name: &PackageName, version: Option<&Version>) -> Result<Vec<u8>>;

    /// The registry's default version, `None` when it has none
    async fn latest_version(&self, name: &PackageName) -> Result<Option<Version>>;

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<PackageSummary>>;

    async fn push(
        &self,
        name: &PackageName,
        version: &Version,
        blob: &[u8],
        force: bool,
    ) -> Result<()>;

    /// Delete one version, or every version when `version` is `None`
    async fn delete_package(&self, name: &PackageName, version: Option<&Version>) -> Result<()>;

    async fn create_channel(&self, package: &PackageName, channel: &str) -> Result<Channel>;

    async fn list_channels(&self, package: &PackageName) -> Result<Vec<Channel>>;

    async fn show_channel(&self, package: &PackageName, channel: &str) -> Result<Channel>;

    async fn add_channel_release(
        &self,
        package: &PackageName,
        channel: &str,
        version: &Version,
    ) -> Result<Channel>;

    async fn remove_channel_release(
        &self,
        package: &PackageName,
        channel: &str,
        version: &Version,
    ) -> Result<Channel>;
}
