//! Package resolution: reference -> concrete version -> unpacked package

use kpm_core::{Package, PackageName};
use semver::Version;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::error::{RegistryError, Result};
use crate::registry::Registry;

/// Which version of a package to resolve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionSelector {
    /// The registry's default version
    #[default]
    Latest,
    Version(Version),
    /// The current release of a channel
    Channel(String),
}

impl VersionSelector {
    /// Build a selector from optional `--version` / `--channel` values
    pub fn from_options(version: Option<&str>, channel: Option<&str>) -> Result<Self> {
        match (version, channel) {
            (Some(_), Some(_)) => Err(RegistryError::InvalidConfig {
                message: "a version and a channel cannot both be given".to_string(),
            }),
            (Some(v), None) => Ok(Self::Version(Version::parse(v.trim_start_matches('v'))?)),
            (None, Some(c)) => Ok(Self::Channel(c.to_string())),
            (None, None) => Ok(Self::Latest),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Version(v) => write!(f, "{}", v),
            Self::Channel(c) => write!(f, "channel {}", c),
        }
    }
}

/// A package name plus version selector
///
/// Text forms: `acme/web`, `acme/web@1.2.0`, `acme/web:stable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: PackageName,
    pub selector: VersionSelector,
}

impl PackageRef {
    pub fn new(name: PackageName, selector: VersionSelector) -> Self {
        Self { name, selector }
    }

    pub fn parse(s: &str) -> Result<Self> {
        if let Some((name, version)) = s.split_once('@') {
            return Ok(Self::new(
                PackageName::parse(name)?,
                VersionSelector::from_options(Some(version), None)?,
            ));
        }
        if let Some((name, channel)) = s.split_once(':') {
            if channel.is_empty() {
                return Err(RegistryError::InvalidConfig {
                    message: format!("empty channel in '{}'", s),
                });
            }
            return Ok(Self::new(
                PackageName::parse(name)?,
                VersionSelector::Channel(channel.to_string()),
            ));
        }
        Ok(Self::new(PackageName::parse(s)?, VersionSelector::Latest))
    }
}

impl FromStr for PackageRef {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            VersionSelector::Latest => write!(f, "{}", self.name),
            VersionSelector::Version(v) => write!(f, "{}@{}", self.name, v),
            VersionSelector::Channel(c) => write!(f, "{}:{}", self.name, c),
        }
    }
}

/// Resolves package references against one registry
///
/// Fetched packages are memoized per resolver instance, keyed by
/// `(name, version)`, so an install followed by a remove in the same run
/// downloads once. Nothing is cached across instances.
pub struct PackageResolver {
    registry: Arc<dyn Registry>,
    memo: Mutex<HashMap<(PackageName, Version), Package>>,
}

impl PackageResolver {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Turn a selector into a concrete version
    pub async fn resolve_version(&self, reference: &PackageRef) -> Result<Version> {
        let name = &reference.name;
        match &reference.selector {
            VersionSelector::Version(v) => Ok(v.clone()),
            VersionSelector::Latest => self
                .registry
                .latest_version(name)
                .await?
                .ok_or_else(|| RegistryError::AmbiguousVersion {
                    name: name.to_string(),
                }),
            VersionSelector::Channel(channel) => {
                let channel = self.registry.show_channel(name, channel).await?;
                channel
                    .current()
                    .cloned()
                    .ok_or_else(|| RegistryError::AmbiguousVersion {
                        name: format!("{} (channel {} has no releases)", name, channel.name),
                    })
            }
        }
    }

    /// Resolve, fetch and unpack a package
    pub async fn resolve(&self, reference: &PackageRef) -> Result<Package> {
        let version = self.resolve_version(reference).await?;
        let key = (reference.name.clone(), version.clone());

        if let Some(package) = self.memo().get(&key) {
            tracing::debug!(package = %reference.name, %version, "using already fetched package");
            return Ok(package.clone());
        }

        tracing::debug!(
            package = %reference.name,
            %version,
            registry = self.registry.endpoint(),
            "fetching package"
        );
        let blob = self.registry.fetch(&reference.name, Some(&version)).await?;
        let package = Package::from_blob(blob).map_err(|e| RegistryError::InvalidPackage {
            name: reference.name.to_string(),
            message: e.to_string(),
        })?;

        if package.name != reference.name || package.version != version {
            return Err(RegistryError::InvalidPackage {
                name: reference.name.to_string(),
                message: format!(
                    "requested {}@{} but the archive contains {}@{}",
                    reference.name, version, package.name, package.version
                ),
            });
        }

        self.memo().insert(key, package.clone());
        Ok(package)
    }

    /// Write the package tree below `dest`, returning the package directory
    pub fn extract(&self, package: &Package, dest: &Path, overwrite: bool) -> Result<PathBuf> {
        let target = package.extract_to(dest, overwrite)?;
        tracing::debug!(package = %package.name, "extracted to {}", target.display());
        Ok(target)
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, HashMap<(PackageName, Version), Package>> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use kpm_core::CoreError;
    use std::fs;
    use tempfile::TempDir;

    fn blob(name: &str, version: &str) -> Vec<u8> {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("manifest.yaml"),
            format!(
                "package:\n  name: {}\n  version: {}\nresources:\n  - name: config\n    file: config.yaml\n",
                name, version
            ),
        )
        .unwrap();
        fs::create_dir(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/config.yaml"),
            "kind: ConfigMap\nmetadata:\n  name: config\n",
        )
        .unwrap();
        kpm_core::archive::pack_dir(dir.path()).unwrap()
    }

    fn name() -> PackageName {
        PackageName::parse("acme/web").unwrap()
    }

    fn setup() -> (MemoryRegistry, PackageResolver) {
        let registry = MemoryRegistry::new();
        registry.insert(&name(), Version::new(1, 0, 0), blob("acme/web", "1.0.0"));
        registry.insert(&name(), Version::new(1, 1, 0), blob("acme/web", "1.1.0"));
        let resolver = PackageResolver::new(Arc::new(registry.clone()));
        (registry, resolver)
    }

    #[test]
    fn test_parse_reference() {
        let r = PackageRef::parse("acme/web@1.2.0").unwrap();
        assert_eq!(r.selector, VersionSelector::Version(Version::new(1, 2, 0)));
        assert_eq!(r.to_string(), "acme/web@1.2.0");

        let r: PackageRef = "acme/web:stable".parse().unwrap();
        assert_eq!(r.selector, VersionSelector::Channel("stable".to_string()));

        let r = PackageRef::parse("acme/web").unwrap();
        assert_eq!(r.selector, VersionSelector::Latest);

        assert!(PackageRef::parse("web").is_err());
        assert!(PackageRef::parse("acme/web@latest").is_err());
        assert!(PackageRef::parse("acme/web:").is_err());
        assert!(VersionSelector::from_options(Some("1.0.0"), Some("stable")).is_err());
    }

    #[tokio::test]
    async fn test_resolve_latest() {
        let (_, resolver) = setup();
        let package = resolver
            .resolve(&PackageRef::parse("acme/web").unwrap())
            .await
            .unwrap();
        assert_eq!(package.version, Version::new(1, 1, 0));
        assert_eq!(package.manifest.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_exact_version() {
        let (_, resolver) = setup();
        let package = resolver
            .resolve(&PackageRef::parse("acme/web@1.0.0").unwrap())
            .await
            .unwrap();
        assert_eq!(package.version, Version::new(1, 0, 0));
    }

    #[tokio::test]
    async fn test_unknown_package_and_version() {
        let (_, resolver) = setup();
        let err = resolver
            .resolve(&PackageRef::parse("acme/db").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));

        let err = resolver
            .resolve(&PackageRef::parse("acme/web@9.9.9").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_no_default_is_ambiguous() {
        let registry = MemoryRegistry::new();
        registry.reserve(&name());
        let resolver = PackageResolver::new(Arc::new(registry));

        let err = resolver
            .resolve(&PackageRef::parse("acme/web").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AmbiguousVersion { .. }));
    }

    #[tokio::test]
    async fn test_resolve_channel() {
        let (registry, resolver) = setup();
        registry.create_channel(&name(), "stable").await.unwrap();
        let reference = PackageRef::parse("acme/web:stable").unwrap();

        let err = resolver.resolve(&reference).await.unwrap_err();
        assert!(matches!(err, RegistryError::AmbiguousVersion { .. }));

        registry
            .add_channel_release(&name(), "stable", &Version::new(1, 0, 0))
            .await
            .unwrap();
        let package = resolver.resolve(&reference).await.unwrap();
        assert_eq!(package.version, Version::new(1, 0, 0));
    }

    #[tokio::test]
    async fn test_identity_mismatch() {
        let registry = MemoryRegistry::new();
        registry.insert(&name(), Version::new(2, 0, 0), blob("acme/web", "1.0.0"));
        let resolver = PackageResolver::new(Arc::new(registry));

        let err = resolver
            .resolve(&PackageRef::parse("acme/web@2.0.0").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPackage { .. }));
    }

    #[tokio::test]
    async fn test_memoized_within_instance() {
        let (registry, resolver) = setup();
        let reference = PackageRef::parse("acme/web@1.0.0").unwrap();
        resolver.resolve(&reference).await.unwrap();
        resolver.resolve(&reference).await.unwrap();
        assert_eq!(registry.operation_counts().fetches, 1);

        let fresh = PackageResolver::new(Arc::new(registry.clone()));
        fresh.resolve(&reference).await.unwrap();
        assert_eq!(registry.operation_counts().fetches, 2);
    }

    #[tokio::test]
    async fn test_extract_refuses_non_empty_destination() {
        let (_, resolver) = setup();
        let package = resolver
            .resolve(&PackageRef::parse("acme/web@1.0.0").unwrap())
            .await
            .unwrap();
        let dest = TempDir::new().unwrap();

        let dir = resolver.extract(&package, dest.path(), false).unwrap();
        assert!(dir.join("manifest.yaml").exists());
        assert!(dir.join("templates/config.yaml").exists());

        let err = resolver.extract(&package, dest.path(), false).unwrap_err();
        assert!(matches!(err, RegistryError::Core(CoreError::Extract { .. })));
        resolver.extract(&package, dest.path(), true).unwrap();
    }
}
