//! kube-rs backed cluster
//!
//! Key features:
//! - Server-Side Apply for idempotent resource management
//! - Dynamic resource handling without compile-time type knowledge
//! - Background-propagation deletes
//! - Pod lookup through the owner's label selector, exec over websockets

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Status};
use kpm_core::{Resource, ResourceKey};
use kube::{
    Client,
    api::{Api, AttachParams, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use super::{ApplyOutcome, Cluster, DeleteOutcome, ExecOutput, FIELD_MANAGER, OwnerKind, PodRef};
use crate::error::{KubeError, Result};

/// Poll interval while waiting for a deletion to finish
const DELETE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cluster backed by a kube-rs client
pub struct KubeCluster {
    /// Kubernetes client
    client: Client,
    /// Cached discovery information, refreshed when a kind is missing
    discovery: RwLock<Discovery>,
}

impl KubeCluster {
    /// Connect using the ambient kubeconfig or in-cluster config
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Self::new(client).await
    }

    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    /// Re-run API discovery (after CRDs were installed)
    async fn refresh_discovery(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().unwrap_or_else(|e| e.into_inner()) = discovery;
        Ok(())
    }

    fn cached(&self, gvk: &GroupVersionKind) -> Option<(ApiResource, ApiCapabilities)> {
        self.discovery
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve_gvk(gvk)
    }

    async fn resolve(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = gvk_from_api_version(api_version, kind);
        if let Some(found) = self.cached(&gvk) {
            return Ok(found);
        }

        // A CRD applied earlier in this run is not in the cache yet
        tracing::debug!(api_version, kind, "kind not in discovery cache, refreshing");
        self.refresh_discovery().await?;
        self.cached(&gvk).ok_or_else(|| KubeError::UnknownKind {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        })
    }

    fn dynamic_api(
        &self,
        api_resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        if capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(
                self.client.clone(),
                namespace.unwrap_or("default"),
                api_resource,
            )
        } else {
            Api::all_with(self.client.clone(), api_resource)
        }
    }

    async fn api_for_key(&self, key: &ResourceKey) -> Result<Api<DynamicObject>> {
        let (api_resource, capabilities) = self.resolve(&key.api_version, &key.kind).await?;
        Ok(self.dynamic_api(&api_resource, &capabilities, key.namespace.as_deref()))
    }

    async fn owner_selector(
        &self,
        owner: OwnerKind,
        name: &str,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>> {
        let selector = match owner {
            OwnerKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                api.get(name)
                    .await?
                    .spec
                    .map(|s| match_labels(s.selector))
            }
            OwnerKind::ReplicaSet => {
                let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
                api.get(name)
                    .await?
                    .spec
                    .map(|s| match_labels(s.selector))
            }
            OwnerKind::ReplicationController => {
                let api: Api<ReplicationController> =
                    Api::namespaced(self.client.clone(), namespace);
                api.get(name).await?.spec.and_then(|s| s.selector)
            }
        };
        Ok(selector.unwrap_or_default())
    }
}

fn match_labels(selector: LabelSelector) -> BTreeMap<String, String> {
    selector.match_labels.unwrap_or_default()
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn apply(&self, resource: &Resource) -> Result<ApplyOutcome> {
        let (api_resource, capabilities) = self.resolve(&resource.api_version, &resource.kind).await?;

        let mut obj: DynamicObject = serde_json::from_value(resource.body.clone())?;
        if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
            obj.metadata.namespace = resource.namespace.clone();
        }

        let api = self.dynamic_api(&api_resource, &capabilities, obj.metadata.namespace.as_deref());

        // Check if resource exists (to determine created vs updated)
        let exists = api.get_opt(&resource.name).await?.is_some();

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&resource.name, &params, &Patch::Apply(&obj)).await?;

        tracing::info!(
            resource = %resource.key(),
            "{}",
            if exists { "configured" } else { "created" }
        );
        Ok(if exists {
            ApplyOutcome::Updated
        } else {
            ApplyOutcome::Created
        })
    }

    async fn delete(&self, key: &ResourceKey) -> Result<DeleteOutcome> {
        let api = self.api_for_key(key).await?;
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(&key.name, &params).await {
            Ok(_) => {
                tracing::info!(resource = %key, "deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                let err = KubeError::Api(e);
                if err.is_not_found() {
                    Ok(DeleteOutcome::NotFound)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn wait_deleted(&self, key: &ResourceKey, timeout: Duration) -> Result<()> {
        let api = self.api_for_key(key).await?;
        let poll = async {
            while api.get_opt(&key.name).await?.is_some() {
                tokio::time::sleep(DELETE_POLL_INTERVAL).await;
            }
            Ok::<_, KubeError>(())
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| KubeError::Timeout {
                what: format!("deletion of {}", key),
                after: timeout,
            })?
    }

    async fn find_pods(
        &self,
        owner: OwnerKind,
        owner_name: &str,
        namespace: &str,
    ) -> Result<Vec<PodRef>> {
        let selector = self.owner_selector(owner, owner_name, namespace).await?;
        if selector.is_empty() {
            return Ok(Vec::new());
        }
        let selector = selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(&selector)).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                let containers = pod
                    .spec
                    .map(|s| s.containers.into_iter().map(|c| c.name).collect())
                    .unwrap_or_default();
                Some(PodRef {
                    name,
                    namespace: namespace.to_string(),
                    containers,
                })
            })
            .collect())
    }

    async fn exec(
        &self,
        pod: &PodRef,
        container: Option<&str>,
        command: &[String],
    ) -> Result<ExecOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);

        let mut params = AttachParams::default().stdin(false).stdout(true).stderr(true);
        if let Some(container) = container.or(pod.containers.first().map(String::as_str)) {
            params = params.container(container);
        }

        let mut attached = pods.exec(&pod.name, command.to_vec(), &params).await?;
        let mut stdout_stream = attached
            .stdout()
            .ok_or_else(|| KubeError::Exec("stdout not attached".to_string()))?;
        let mut stderr_stream = attached
            .stderr()
            .ok_or_else(|| KubeError::Exec("stderr not attached".to_string()))?;
        let status = attached.take_status();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (out, err) = tokio::join!(
            stdout_stream.read_to_end(&mut stdout),
            stderr_stream.read_to_end(&mut stderr)
        );
        out?;
        err?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| KubeError::Exec(e.to_string()))?;

        Ok(ExecOutput {
            exit_code: exit_code(status.as_ref()),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

/// Exit code carried by the exec status channel
fn exit_code(status: Option<&Status>) -> i32 {
    let Some(status) = status else {
        return 0;
    };
    if status.status.as_deref() == Some("Success") {
        return 0;
    }
    status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message.as_deref())
        })
        .and_then(|code| code.parse().ok())
        .unwrap_or(1)
}

/// Split `apiVersion` into group and version
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    GroupVersionKind::gvk(group, version, kind)
}
