//! The cluster collaborator
//!
//! kpm talks to a cluster through the [`Cluster`] trait:
//! - **KubeCluster**: kube-rs client with API discovery and server-side apply
//! - **MemoryCluster**: in-memory objects with fault injection, for tests

mod client;
mod memory;

pub use client::KubeCluster;
pub use memory::{ClusterOp, Fault, MemoryCluster};

use async_trait::async_trait;
use kpm_core::{Resource, ResourceKey};
use std::fmt;
use std::time::Duration;

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "kpm";

/// What `apply` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
}

/// What `delete` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Workload kinds whose pods can be looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Deployment,
    ReplicaSet,
    ReplicationController,
}

impl OwnerKind {
    pub fn parse(kind: &str) -> Result<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "deployment" | "deploy" => Ok(Self::Deployment),
            "rs" | "replicaset" => Ok(Self::ReplicaSet),
            "rc" | "replicationcontroller" => Ok(Self::ReplicationController),
            _ => Err(KubeError::UnsupportedOwner(kind.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::ReplicaSet => "ReplicaSet",
            Self::ReplicationController => "ReplicationController",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pod found through its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    /// Container names in spec order
    pub containers: Vec<String>,
}

/// Result of running a command in a pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations kpm needs from a cluster
///
/// Implementations classify failures through [`KubeError::class`] so the
/// reconciler can tell transient errors and conflicts from the rest.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Create or update the object
    async fn apply(&self, resource: &Resource) -> Result<ApplyOutcome>;

    /// Delete the object; an absent object is `NotFound`, not an error
    async fn delete(&self, key: &ResourceKey) -> Result<DeleteOutcome>;

    /// Block until the object no longer exists
    async fn wait_deleted(&self, key: &ResourceKey, timeout: Duration) -> Result<()>;

    async fn find_pods(
        &self,
        owner: OwnerKind,
        owner_name: &str,
        namespace: &str,
    ) -> Result<Vec<PodRef>>;

    /// Run a command; `container` defaults to the pod's first container
    async fn exec(
        &self,
        pod: &PodRef,
        container: Option<&str>,
        command: &[String],
    ) -> Result<ExecOutput>;
}
