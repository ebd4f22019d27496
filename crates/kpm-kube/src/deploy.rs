//! The deploy pipeline: resolve, render, shard, reconcile
//!
//! [`Deployer::plan`] computes the desired state without touching a
//! cluster; [`Deployer::run`] plans and then reconciles according to the
//! request's mode. Any resolve, render or shard error aborts before the
//! first cluster call.

use kpm_core::{Package, Resource, ShardSpec, Variables, expand};
use kpm_engine::{RenderedSet, RendererKind, compose};
use kpm_registry::{PackageRef, PackageResolver};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{KubeError, Result};
use crate::reconciler::{ClusterReconciler, DeployMode, ReconcileReport};
use crate::retry::CancelToken;

/// Where the package comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Registry(PackageRef),
    /// A package source tree on disk
    Local(PathBuf),
}

/// Everything needed to deploy a package
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub source: Source,
    pub namespace: String,
    /// Caller overrides, layered over the package defaults
    pub variables: Variables,
    /// Overrides the manifest's `shards` default when set
    pub shard_spec: Option<ShardSpec>,
    pub mode: DeployMode,
    pub renderer: RendererKind,
    /// Extract the package tree here when set
    pub destination: Option<PathBuf>,
    pub overwrite: bool,
}

impl DeploymentRequest {
    pub fn new(source: Source, namespace: impl Into<String>) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            variables: Variables::new(),
            shard_spec: None,
            mode: DeployMode::default(),
            renderer: RendererKind::default(),
            destination: None,
            overwrite: false,
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_shards(mut self, spec: ShardSpec) -> Self {
        self.shard_spec = Some(spec);
        self
    }

    pub fn with_mode(mut self, mode: DeployMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_renderer(mut self, renderer: RendererKind) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_destination(mut self, destination: PathBuf, overwrite: bool) -> Self {
        self.destination = Some(destination);
        self.overwrite = overwrite;
        self
    }
}

/// The computed desired state
#[derive(Debug, Clone)]
pub struct Plan {
    pub package: Package,
    /// Composed resources in apply order
    pub resources: Vec<Resource>,
    /// Number of shard contexts rendered
    pub shards: usize,
    pub renderer: RendererKind,
    /// Package directory when the request asked for extraction
    pub extracted_to: Option<PathBuf>,
}

impl Plan {
    pub fn rendered(&self) -> RenderedSet {
        RenderedSet::new(self.resources.clone())
    }
}

/// Result of [`Deployer::run`]
#[derive(Debug, Clone)]
pub struct Deployment {
    pub plan: Plan,
    pub report: ReconcileReport,
}

/// Runs the deploy pipeline
///
/// The resolver is only needed for registry sources and the reconciler only
/// for modes that touch a cluster.
#[derive(Default)]
pub struct Deployer {
    resolver: Option<Arc<PackageResolver>>,
    reconciler: Option<ClusterReconciler>,
}

impl Deployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: Arc<PackageResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_reconciler(mut self, reconciler: ClusterReconciler) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Resolve the package and compose the desired state
    pub async fn plan(&self, request: &DeploymentRequest) -> Result<Plan> {
        let package = match &request.source {
            Source::Registry(reference) => {
                let resolver = self
                    .resolver
                    .as_ref()
                    .ok_or(KubeError::NotConfigured("package registry"))?;
                resolver.resolve(reference).await?
            }
            Source::Local(path) => Package::from_dir(path)?,
        };
        let manifest = &package.manifest;

        let base = Variables::layered(manifest.defaults(), &request.variables, &request.namespace);
        let spec = request
            .shard_spec
            .clone()
            .or_else(|| manifest.shards.clone())
            .unwrap_or_default();
        let contexts = expand(&spec, &base)?;

        let renderer = request.renderer.build();
        let resources = compose(manifest, &contexts, renderer.as_ref())?;

        // Only a package that renders is written out
        let extracted_to = match &request.destination {
            Some(dest) => Some(package.extract_to(dest, request.overwrite)?),
            None => None,
        };

        tracing::debug!(
            package = %package.name,
            version = %package.version,
            shards = contexts.len(),
            resources = resources.len(),
            "planned deployment"
        );

        Ok(Plan {
            shards: contexts.len(),
            renderer: request.renderer,
            resources,
            extracted_to,
            package,
        })
    }

    /// Plan, then reconcile according to the request's mode
    pub async fn run(&self, request: &DeploymentRequest, cancel: &CancelToken) -> Result<Deployment> {
        let plan = self.plan(request).await?;

        let report = if request.mode.is_dry_run() {
            ReconcileReport::planned(&plan.resources)
        } else {
            let reconciler = self
                .reconciler
                .as_ref()
                .ok_or(KubeError::NotConfigured("cluster"))?;
            tracing::info!(
                package = %plan.package.name,
                namespace = %request.namespace,
                mode = %request.mode,
                "reconciling {} resources",
                plan.resources.len()
            );
            reconciler
                .reconcile(&plan.resources, request.mode, cancel)
                .await
        };

        Ok(Deployment { plan, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::reconciler::ResourceStatus;
    use kpm_core::CoreError;
    use kpm_engine::EngineError;
    use kpm_registry::{MemoryRegistry, Registry};
    use semver::Version;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const MANIFEST: &str = "\
package:
  name: acme/web
  version: 1.0.0
variables:
  image: nginx:1.25
  replicas: 2
resources:
  - name: config
    file: config.yaml
  - name: web
    file: web.yaml
";

    const CONFIG: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: web-config
data:
  image: ${image}
";

    const WEB: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: ${replicas}
";

    fn write_package(root: &Path, manifest: &str) {
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(root.join("manifest.yaml"), manifest).unwrap();
        fs::write(root.join("templates/config.yaml"), CONFIG).unwrap();
        fs::write(root.join("templates/web.yaml"), WEB).unwrap();
    }

    fn local(manifest: &str) -> (TempDir, DeploymentRequest) {
        let dir = TempDir::new().unwrap();
        write_package(dir.path(), manifest);
        let request = DeploymentRequest::new(Source::Local(dir.path().to_path_buf()), "prod");
        (dir, request)
    }

    async fn registry() -> MemoryRegistry {
        let dir = TempDir::new().unwrap();
        write_package(dir.path(), MANIFEST);
        let blob = kpm_core::archive::pack_dir(dir.path()).unwrap();
        let registry = MemoryRegistry::new();
        registry
            .push(
                &kpm_core::PackageName::parse("acme/web").unwrap(),
                &Version::new(1, 0, 0),
                &blob,
                false,
            )
            .await
            .unwrap();
        registry
    }

    fn cluster_deployer(cluster: &MemoryCluster) -> Deployer {
        Deployer::new().with_reconciler(ClusterReconciler::new(Arc::new(cluster.clone())))
    }

    #[tokio::test]
    async fn test_local_dry_run_makes_no_cluster_calls() {
        let (_dir, request) = local(MANIFEST);
        let cluster = MemoryCluster::new();

        let deployment = cluster_deployer(&cluster)
            .run(&request.with_mode(DeployMode::DryRun), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(cluster.call_count(), 0);
        assert_eq!(deployment.plan.rendered().names(), vec!["ConfigMap/web-config", "Deployment/web"]);
        assert_eq!(deployment.report.count(ResourceStatus::Planned), 2);
        assert_eq!(deployment.plan.resources[1].body["spec"]["replicas"], json!(2));
        assert_eq!(deployment.plan.resources[0].namespace.as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_cluster() {
        let (_dir, request) = local(MANIFEST);
        let deployment = Deployer::new()
            .run(&request.with_mode(DeployMode::DryRun), &CancelToken::new())
            .await
            .unwrap();
        assert!(deployment.report.is_success());

        let (_dir, request) = local(MANIFEST);
        let err = Deployer::new().run(&request, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, KubeError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_dry_run_and_install_share_plan() {
        let (_dir, request) = local(MANIFEST);
        let request = request.with_shards(ShardSpec::Count(2));
        let deployer = Deployer::new();

        let dry = deployer
            .plan(&request.clone().with_mode(DeployMode::DryRun))
            .await
            .unwrap();
        let install = deployer.plan(&request).await.unwrap();
        assert_eq!(dry.resources, install.resources);
        assert_eq!(
            dry.rendered().to_json().unwrap(),
            install.rendered().to_json().unwrap()
        );
    }

    #[tokio::test]
    async fn test_registry_install_with_shards() {
        let registry = registry().await;
        let cluster = MemoryCluster::new();
        let deployer = cluster_deployer(&cluster)
            .with_resolver(Arc::new(PackageResolver::new(Arc::new(registry.clone()))));

        let request = DeploymentRequest::new(
            Source::Registry(PackageRef::parse("acme/web").unwrap()),
            "prod",
        )
        .with_shards(ShardSpec::Count(3));
        let deployment = deployer.run(&request, &CancelToken::new()).await.unwrap();

        assert_eq!(deployment.plan.shards, 3);
        assert_eq!(deployment.report.count(ResourceStatus::Created), 6);
        assert_eq!(cluster.object_count(), 6);
        let names: Vec<String> = deployment.plan.resources.iter().map(|r| r.name.clone()).collect();
        insta::assert_snapshot!(names.join(","), @"web-config-0,web-0,web-config-1,web-1,web-config-2,web-2");
    }

    #[tokio::test]
    async fn test_install_then_remove_fetches_once() {
        let registry = registry().await;
        let cluster = MemoryCluster::new();
        let deployer = cluster_deployer(&cluster)
            .with_resolver(Arc::new(PackageResolver::new(Arc::new(registry.clone()))));
        let request = DeploymentRequest::new(
            Source::Registry(PackageRef::parse("acme/web@1.0.0").unwrap()),
            "prod",
        );

        deployer.run(&request, &CancelToken::new()).await.unwrap();
        let removed = deployer
            .run(&request.clone().with_mode(DeployMode::Remove), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(removed.report.count(ResourceStatus::Deleted), 2);
        assert_eq!(cluster.object_count(), 0);
        assert_eq!(registry.operation_counts().fetches, 1);
    }

    #[tokio::test]
    async fn test_manifest_shards_default() {
        let manifest = format!("{}shards: 2\n", MANIFEST);
        let (_dir, request) = local(&manifest);

        let plan = Deployer::new().plan(&request).await.unwrap();
        assert_eq!(plan.shards, 2);
        assert_eq!(plan.resources.len(), 4);

        let plan = Deployer::new()
            .plan(&request.with_shards(ShardSpec::None))
            .await
            .unwrap();
        assert_eq!(plan.shards, 1);
    }

    #[tokio::test]
    async fn test_render_error_aborts_before_cluster() {
        let manifest = MANIFEST.replace("  replicas: 2\n", "");
        let (_dir, request) = local(&manifest);
        let cluster = MemoryCluster::new();

        let err = cluster_deployer(&cluster)
            .run(&request, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KubeError::Engine(EngineError::UndefinedVariable { ref name, .. }) if name == "replicas"
        ));
        assert_eq!(cluster.call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_shard_ids_abort() {
        let (_dir, request) = local(MANIFEST);
        let spec = ShardSpec::parse(r#"[{"name": "eu"}, {"name": "eu"}]"#).unwrap();
        let cluster = MemoryCluster::new();

        let err = cluster_deployer(&cluster)
            .run(&request.with_shards(spec), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Core(CoreError::InvalidShardSpec { .. })));
        assert_eq!(cluster.call_count(), 0);
    }

    #[tokio::test]
    async fn test_extracts_to_destination() {
        let (_dir, request) = local(MANIFEST);
        let dest = TempDir::new().unwrap();

        let plan = Deployer::new()
            .plan(&request.with_destination(dest.path().to_path_buf(), false))
            .await
            .unwrap();
        let extracted = plan.extracted_to.unwrap();
        assert!(extracted.join("templates/web.yaml").is_file());
        assert!(extracted.ends_with("acme_web_1.0.0"));
    }

    #[tokio::test]
    async fn test_render_error_leaves_destination_untouched() {
        let manifest = MANIFEST.replace("  replicas: 2\n", "");
        let (_dir, request) = local(&manifest);
        let dest = TempDir::new().unwrap();

        let err = Deployer::new()
            .plan(&request.with_destination(dest.path().to_path_buf(), false))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Engine(EngineError::UndefinedVariable { .. })));
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }
}
