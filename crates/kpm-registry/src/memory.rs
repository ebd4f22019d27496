//! In-memory registry
//!
//! Stores blobs and channels in process memory. Used by tests and for
//! rendering against packages that never left the machine.

use async_trait::async_trait;
use chrono::Utc;
use kpm_core::PackageName;
use semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RegistryError, Result};
use crate::registry::{Channel, ChannelRelease, PackageFilter, PackageSummary, Registry};

#[derive(Debug, Default)]
struct Store {
    /// name -> version -> blob
    packages: BTreeMap<PackageName, BTreeMap<Version, Vec<u8>>>,
    /// Explicit default version, otherwise the highest
    defaults: HashMap<PackageName, Version>,
    /// name -> channel name -> channel
    channels: BTreeMap<PackageName, BTreeMap<String, Channel>>,
}

/// In-memory registry for testing
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    store: Arc<RwLock<Store>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OperationCounts {
    pub fetches: usize,
    pub lookups: usize,
    pub pushes: usize,
    pub deletes: usize,
    pub channel_reads: usize,
    pub channel_writes: usize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        read(&self.operations).clone()
    }

    /// Override the version served when none is requested
    pub fn set_default(&self, name: &PackageName, version: Version) {
        write(&self.store).defaults.insert(name.clone(), version);
    }

    /// Publish a blob, replacing any existing one
    pub fn insert(&self, name: &PackageName, version: Version, blob: Vec<u8>) {
        write(&self.store)
            .packages
            .entry(name.clone())
            .or_default()
            .insert(version, blob);
    }

    /// Register a package name with no published versions
    pub fn reserve(&self, name: &PackageName) {
        write(&self.store).packages.entry(name.clone()).or_default();
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut write(&self.operations));
    }

    fn default_version(store: &Store, name: &PackageName) -> Option<Version> {
        store.defaults.get(name).cloned().or_else(|| {
            store
                .packages
                .get(name)
                .and_then(|versions| versions.keys().next_back().cloned())
        })
    }

    fn channel_mut<'a>(
        store: &'a mut Store,
        package: &PackageName,
        channel: &str,
    ) -> Result<&'a mut Channel> {
        store
            .channels
            .get_mut(package)
            .and_then(|channels| channels.get_mut(channel))
            .ok_or_else(|| RegistryError::not_found(format!("channel {}/{}", package, channel)))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn endpoint(&self) -> &str {
        "memory://"
    }

    async fn api_version(&self) -> Result<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }

    async fn fetch(&self, name: &PackageName, version: Option<&Version>) -> Result<Vec<u8>> {
        self.count(|ops| ops.fetches += 1);
        let store = read(&self.store);
        let version = match version {
            Some(v) => v.clone(),
            None => Self::default_version(&store, name)
                .ok_or_else(|| RegistryError::not_found(format!("package {}", name)))?,
        };
        store
            .packages
            .get(name)
            .ok_or_else(|| RegistryError::not_found(format!("package {}", name)))?
            .get(&version)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(format!("package {}@{}", name, version)))
    }

    async fn latest_version(&self, name: &PackageName) -> Result<Option<Version>> {
        self.count(|ops| ops.lookups += 1);
        let store = read(&self.store);
        if !store.packages.contains_key(name) {
            return Err(RegistryError::not_found(format!("package {}", name)));
        }
        Ok(Self::default_version(&store, name))
    }

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<PackageSummary>> {
        self.count(|ops| ops.lookups += 1);
        let store = read(&self.store);
        let owner = filter.user.as_ref().or(filter.organization.as_ref());

        Ok(store
            .packages
            .iter()
            .filter(|(name, _)| owner.is_none_or(|o| name.namespace() == o))
            .map(|(name, versions)| PackageSummary {
                name: name.clone(),
                default: Self::default_version(&store, name),
                versions: versions.keys().cloned().collect(),
                channels: store
                    .channels
                    .get(name)
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn push(
        &self,
        name: &PackageName,
        version: &Version,
        blob: &[u8],
        force: bool,
    ) -> Result<()> {
        self.count(|ops| ops.pushes += 1);
        let mut store = write(&self.store);
        let versions = store.packages.entry(name.clone()).or_default();
        if versions.contains_key(version) && !force {
            return Err(RegistryError::Conflict {
                message: format!("package {}@{} already exists", name, version),
            });
        }
        versions.insert(version.clone(), blob.to_vec());
        Ok(())
    }

    async fn delete_package(&self, name: &PackageName, version: Option<&Version>) -> Result<()> {
        self.count(|ops| ops.deletes += 1);
        let mut store = write(&self.store);
        let versions = store
            .packages
            .get_mut(name)
            .ok_or_else(|| RegistryError::not_found(format!("package {}", name)))?;

        match version {
            Some(v) => {
                versions
                    .remove(v)
                    .ok_or_else(|| RegistryError::not_found(format!("package {}@{}", name, v)))?;
                if versions.is_empty() {
                    store.packages.remove(name);
                }
            }
            None => {
                store.packages.remove(name);
            }
        }
        if store.defaults.get(name).is_some_and(|d| version.is_none_or(|v| v == d)) {
            store.defaults.remove(name);
        }
        Ok(())
    }

    async fn create_channel(&self, package: &PackageName, channel: &str) -> Result<Channel> {
        self.count(|ops| ops.channel_writes += 1);
        let mut store = write(&self.store);
        let channels = store.channels.entry(package.clone()).or_default();
        if channels.contains_key(channel) {
            return Err(RegistryError::Conflict {
                message: format!("channel {}/{} already exists", package, channel),
            });
        }
        let created = Channel::new(package.clone(), channel);
        channels.insert(channel.to_string(), created.clone());
        Ok(created)
    }

    async fn list_channels(&self, package: &PackageName) -> Result<Vec<Channel>> {
        self.count(|ops| ops.channel_reads += 1);
        let store = read(&self.store);
        Ok(store
            .channels
            .get(package)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn show_channel(&self, package: &PackageName, channel: &str) -> Result<Channel> {
        self.count(|ops| ops.channel_reads += 1);
        let store = read(&self.store);
        store
            .channels
            .get(package)
            .and_then(|channels| channels.get(channel))
            .cloned()
            .ok_or_else(|| RegistryError::not_found(format!("channel {}/{}", package, channel)))
    }

    async fn add_channel_release(
        &self,
        package: &PackageName,
        channel: &str,
        version: &Version,
    ) -> Result<Channel> {
        self.count(|ops| ops.channel_writes += 1);
        let mut store = write(&self.store);
        let published = store
            .packages
            .get(package)
            .is_some_and(|versions| versions.contains_key(version));
        if !published {
            return Err(RegistryError::not_found(format!(
                "package {}@{}",
                package, version
            )));
        }

        let entry = Self::channel_mut(&mut store, package, channel)?;
        if entry.contains(version) {
            return Err(RegistryError::Conflict {
                message: format!("{} is already released on {}", version, channel),
            });
        }
        entry.releases.push(ChannelRelease {
            version: version.clone(),
            created_at: Utc::now(),
        });
        Ok(entry.clone())
    }

    async fn remove_channel_release(
        &self,
        package: &PackageName,
        channel: &str,
        version: &Version,
    ) -> Result<Channel> {
        self.count(|ops| ops.channel_writes += 1);
        let mut store = write(&self.store);
        let entry = Self::channel_mut(&mut store, package, channel)?;
        let before = entry.releases.len();
        entry.releases.retain(|r| &r.version != version);
        if entry.releases.len() == before {
            return Err(RegistryError::not_found(format!(
                "release {} on channel {}",
                version, channel
            )));
        }
        Ok(entry.clone())
    }
}
