//! kpm Kube - Kubernetes integration for kpm
//!
//! This crate provides:
//! - **Cluster**: the cluster collaborator trait, with kube-rs and in-memory backends
//! - **Reconciler**: install, force-install, remove and dry-run with per-resource reports
//! - **Retry**: exponential backoff for transient errors and a cancellation token
//! - **Deployer**: the resolve → render → shard → reconcile pipeline
//! - **Console**: command execution in a workload's pod

pub mod cluster;
pub mod console;
pub mod deploy;
pub mod error;
pub mod reconciler;
pub mod retry;

pub use cluster::{
    ApplyOutcome, Cluster, ClusterOp, DeleteOutcome, ExecOutput, FIELD_MANAGER, Fault,
    KubeCluster, MemoryCluster, OwnerKind, PodRef,
};
pub use console::exec_in_first_pod;
pub use deploy::{Deployer, Deployment, DeploymentRequest, Plan, Source};
pub use error::{ErrorClass, KubeError, Result};
pub use reconciler::{
    ClusterReconciler, DeployMode, ReconcileReport, ResourceReport, ResourceStatus,
};
pub use retry::{CancelToken, RetryPolicy};
