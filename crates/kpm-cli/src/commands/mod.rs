//! CLI commands

pub mod channel;
pub mod delete_package;
pub mod deploy;
pub mod exec;
pub mod generate;
pub mod list;
pub mod new;
pub mod pull;
pub mod push;
pub mod render;
pub mod show;
pub mod version;

use clap::Args;
use kpm_core::{ShardSpec, Variables, parse_overrides};
use kpm_engine::RendererKind;
use kpm_kube::{ClusterReconciler, DeployMode, DeploymentRequest, KubeCluster, RetryPolicy, Source};
use kpm_registry::{
    HttpRegistry, KpmConfig, PackageRef, PackageResolver, Registry, VersionSelector,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{CliError, Result};

/// Settings shared by every command: the loaded config with flag and
/// environment overrides applied
pub struct Context {
    pub config: KpmConfig,
}

impl Context {
    pub fn new(config: KpmConfig) -> Self {
        Self { config }
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn registry(&self) -> Result<Arc<dyn Registry>> {
        let registry = HttpRegistry::new(&self.config.registry, self.config.timeout)?;
        Ok(Arc::new(registry))
    }

    pub fn resolver(&self) -> Result<Arc<PackageResolver>> {
        Ok(Arc::new(PackageResolver::new(self.registry()?)))
    }

    /// Connect to the cluster from the ambient kubeconfig
    pub async fn reconciler(&self, parallel_shards: bool) -> Result<ClusterReconciler> {
        let cluster = KubeCluster::connect().await?;
        Ok(ClusterReconciler::new(Arc::new(cluster))
            .with_retry(RetryPolicy::from(&self.config.retry))
            .parallel_shards(parallel_shards))
    }
}

/// A registry package with an optional version or channel
#[derive(Args, Debug, Clone)]
pub struct RegistryPackage {
    /// Package reference: namespace/name, namespace/name@version or namespace/name:channel
    pub package: String,

    /// Package version
    #[arg(short, long, conflicts_with = "channel")]
    pub version: Option<String>,

    /// Release channel; its current release is used
    #[arg(long)]
    pub channel: Option<String>,
}

impl RegistryPackage {
    pub fn reference(&self) -> Result<PackageRef> {
        reference(&self.package, self.version.as_deref(), self.channel.as_deref())
    }
}

/// Package selection by registry reference or local directory
#[derive(Args, Debug, Clone)]
pub struct PackageSelector {
    /// Package reference: namespace/name, namespace/name@version or namespace/name:channel
    #[arg(required_unless_present = "local", conflicts_with = "local")]
    pub package: Option<String>,

    /// Use a local package directory instead of the registry
    #[arg(long, value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Package version
    #[arg(short, long, conflicts_with = "channel")]
    pub version: Option<String>,

    /// Release channel; its current release is used
    #[arg(long)]
    pub channel: Option<String>,
}

impl PackageSelector {
    pub fn source(&self) -> Result<Source> {
        if let Some(dir) = &self.local {
            if self.version.is_some() || self.channel.is_some() {
                return Err(CliError::input(
                    "--version and --channel only apply to registry packages",
                ));
            }
            return Ok(Source::Local(dir.clone()));
        }
        let package = self
            .package
            .as_deref()
            .ok_or_else(|| CliError::input("a package reference or --local is required"))?;
        Ok(Source::Registry(reference(
            package,
            self.version.as_deref(),
            self.channel.as_deref(),
        )?))
    }
}

/// Parse a package reference; `--version`/`--channel` fill in the selector
/// when the reference carries none
fn reference(package: &str, version: Option<&str>, channel: Option<&str>) -> Result<PackageRef> {
    let mut reference = PackageRef::parse(package)?;
    let flags = VersionSelector::from_options(version, channel)?;
    if flags != VersionSelector::Latest {
        if reference.selector != VersionSelector::Latest {
            return Err(CliError::validation_with_help(
                format!("'{}' already selects {}", package, reference.selector),
                "drop --version/--channel or the @version/:channel suffix",
            ));
        }
        reference.selector = flags;
    }
    Ok(reference)
}

/// Options shared by deploy, remove and generate
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub package: PackageSelector,

    /// Variable overrides: key=value (dotted keys, JSON values) or a JSON object
    #[arg(short = 'x', long = "variables", value_name = "VARS")]
    pub variables: Vec<String>,

    /// YAML or JSON files of variables, merged before -x values
    #[arg(long = "variables-file", value_name = "FILE")]
    pub variables_files: Vec<PathBuf>,

    /// Shards: a count or a JSON list of shard objects
    #[arg(long, allow_hyphen_values = true)]
    pub shards: Option<String>,

    /// Render templates as expressions instead of plain ${var} substitution
    #[arg(short = 'j', long)]
    pub expression: bool,

    /// Extract the package into this directory
    #[arg(long, value_name = "DIR")]
    pub tmpdir: Option<PathBuf>,

    /// Allow extraction into a non-empty directory
    #[arg(long, requires = "tmpdir")]
    pub overwrite: bool,
}

impl RenderArgs {
    pub fn variables(&self) -> Result<Variables> {
        let mut variables = Variables::new();
        for file in &self.variables_files {
            variables.merge(&Variables::from_file(file)?);
        }
        variables.merge(&parse_overrides(&self.variables)?);
        Ok(variables)
    }

    pub fn request(&self, namespace: &str, mode: DeployMode) -> Result<DeploymentRequest> {
        let renderer = if self.expression {
            RendererKind::Expression
        } else {
            RendererKind::Plain
        };

        let mut request = DeploymentRequest::new(self.package.source()?, namespace)
            .with_variables(self.variables()?)
            .with_mode(mode)
            .with_renderer(renderer);
        if let Some(shards) = &self.shards {
            request = request.with_shards(ShardSpec::parse(shards)?);
        }
        if let Some(dir) = &self.tmpdir {
            request = request.with_destination(dir.clone(), self.overwrite);
        }
        Ok(request)
    }
}
