//! Reconcile a desired resource list against a cluster
//!
//! Resources are processed in declared order. Failures are recorded per
//! resource and never stop the run; transient errors are retried under the
//! reconciler's [`RetryPolicy`]. With `parallel_shards` each shard's
//! resources still run in order while distinct shards run concurrently, and
//! the report is reassembled in declared order.

use futures::future::join_all;
use kpm_core::{Resource, ResourceKey, Shard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{ApplyOutcome, Cluster, DeleteOutcome};
use crate::error::KubeError;
use crate::retry::{CancelToken, RetryPolicy};

/// How long a force install waits for the old object to disappear
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(120);

/// What to do with the desired state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeployMode {
    /// Create or update every resource
    #[default]
    Install,
    /// Delete then re-create every resource
    ForceInstall,
    /// Delete every resource
    Remove,
    /// Compute everything, touch nothing
    DryRun,
}

impl DeployMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::ForceInstall => "force-install",
            Self::Remove => "remove",
            Self::DryRun => "dry-run",
        };
        f.write_str(s)
    }
}

/// Outcome for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
    /// Dry run: would have been reconciled
    Planned,
    Created,
    Updated,
    /// Deleted and created again
    Recreated,
    Deleted,
    /// Nothing to delete
    Absent,
    /// The existing object cannot take the change
    Conflict,
    Failed,
    /// Not attempted because the run was cancelled
    Cancelled,
}

impl ResourceStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Conflict | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Recreated => "recreated",
            Self::Deleted => "deleted",
            Self::Absent => "absent",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report line for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub key: ResourceKey,
    pub shard: Option<Shard>,
    pub status: ResourceStatus,
    /// Cluster calls made, retries included
    pub attempts: u32,
    pub error: Option<String>,
}

impl ResourceReport {
    fn new(resource: &Resource, status: ResourceStatus, attempts: u32) -> Self {
        Self {
            key: resource.key(),
            shard: resource.shard.clone(),
            status,
            attempts,
            error: None,
        }
    }

    fn failed(resource: &Resource, error: &KubeError, attempts: u32) -> Self {
        let status = if error.is_conflict() {
            ResourceStatus::Conflict
        } else {
            ResourceStatus::Failed
        };
        Self {
            error: Some(error.to_string()),
            ..Self::new(resource, status, attempts)
        }
    }
}

/// Per-resource results of a reconcile run, in declared order
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub mode: DeployMode,
    pub resources: Vec<ResourceReport>,
}

impl ReconcileReport {
    /// Dry-run report: every resource `Planned`, nothing attempted
    pub fn planned(resources: &[Resource]) -> Self {
        Self {
            mode: DeployMode::DryRun,
            resources: resources
                .iter()
                .map(|r| ResourceReport::new(r, ResourceStatus::Planned, 0))
                .collect(),
        }
    }

    /// No resource failed or conflicted, and none was skipped by cancellation
    pub fn is_success(&self) -> bool {
        self.resources
            .iter()
            .all(|r| !r.status.is_failure() && r.status != ResourceStatus::Cancelled)
    }

    /// Failed and conflicting resources
    pub fn failed(&self) -> Vec<&ResourceReport> {
        self.resources
            .iter()
            .filter(|r| r.status.is_failure())
            .collect()
    }

    pub fn count(&self, status: ResourceStatus) -> usize {
        self.resources.iter().filter(|r| r.status == status).count()
    }

    pub fn was_cancelled(&self) -> bool {
        self.count(ResourceStatus::Cancelled) > 0
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        const ORDER: [ResourceStatus; 9] = [
            ResourceStatus::Planned,
            ResourceStatus::Created,
            ResourceStatus::Updated,
            ResourceStatus::Recreated,
            ResourceStatus::Deleted,
            ResourceStatus::Absent,
            ResourceStatus::Conflict,
            ResourceStatus::Failed,
            ResourceStatus::Cancelled,
        ];
        let parts: Vec<String> = ORDER
            .iter()
            .filter_map(|status| match self.count(*status) {
                0 => None,
                n => Some(format!("{} {}", n, status)),
            })
            .collect();
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Drives a [`Cluster`] towards a desired resource list
pub struct ClusterReconciler {
    cluster: Arc<dyn Cluster>,
    retry: RetryPolicy,
    parallel_shards: bool,
}

impl ClusterReconciler {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self {
            cluster,
            retry: RetryPolicy::default(),
            parallel_shards: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run distinct shards concurrently
    pub fn parallel_shards(mut self, enabled: bool) -> Self {
        self.parallel_shards = enabled;
        self
    }

    pub async fn reconcile(
        &self,
        resources: &[Resource],
        mode: DeployMode,
        cancel: &CancelToken,
    ) -> ReconcileReport {
        if mode.is_dry_run() {
            return ReconcileReport::planned(resources);
        }

        let reports = if self.parallel_shards {
            self.reconcile_by_shard(resources, mode, cancel).await
        } else {
            let all: Vec<usize> = (0..resources.len()).collect();
            self.reconcile_sequence(resources, &all, mode, cancel).await
        };

        let report = ReconcileReport {
            mode,
            resources: reports,
        };
        tracing::debug!(%mode, "reconciled: {}", report.summary());
        report
    }

    async fn reconcile_by_shard(
        &self,
        resources: &[Resource],
        mode: DeployMode,
        cancel: &CancelToken,
    ) -> Vec<ResourceReport> {
        // Group indices by shard id, in order of first appearance
        let mut groups: Vec<(Option<&str>, Vec<usize>)> = Vec::new();
        for (index, resource) in resources.iter().enumerate() {
            let id = resource.shard.as_ref().map(|s| s.id.as_str());
            match groups.iter_mut().find(|(g, _)| *g == id) {
                Some((_, indices)) => indices.push(index),
                None => groups.push((id, vec![index])),
            }
        }

        let runs = groups.iter().map(|(_, indices)| async move {
            let reports = self
                .reconcile_sequence(resources, indices, mode, cancel)
                .await;
            indices.iter().copied().zip(reports).collect::<Vec<_>>()
        });

        let mut indexed: Vec<(usize, ResourceReport)> =
            join_all(runs).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, report)| report).collect()
    }

    async fn reconcile_sequence(
        &self,
        resources: &[Resource],
        indices: &[usize],
        mode: DeployMode,
        cancel: &CancelToken,
    ) -> Vec<ResourceReport> {
        let mut reports = Vec::with_capacity(indices.len());
        for &index in indices {
            let resource = &resources[index];
            let report = if cancel.is_cancelled() {
                ResourceReport::new(resource, ResourceStatus::Cancelled, 0)
            } else {
                self.reconcile_one(resource, mode).await
            };
            if let Some(error) = &report.error {
                tracing::warn!(resource = %report.key, status = %report.status, "{}", error);
            }
            reports.push(report);
        }
        reports
    }

    async fn reconcile_one(&self, resource: &Resource, mode: DeployMode) -> ResourceReport {
        let key = resource.key();
        match mode {
            DeployMode::DryRun => ResourceReport::new(resource, ResourceStatus::Planned, 0),
            DeployMode::Install => {
                let (result, attempts) = self
                    .retry
                    .run("apply", || self.cluster.apply(resource))
                    .await;
                match result {
                    Ok(ApplyOutcome::Created) => {
                        ResourceReport::new(resource, ResourceStatus::Created, attempts)
                    }
                    Ok(ApplyOutcome::Updated) => {
                        ResourceReport::new(resource, ResourceStatus::Updated, attempts)
                    }
                    Err(e) => ResourceReport::failed(resource, &e, attempts),
                }
            }
            DeployMode::Remove => {
                let (result, attempts) =
                    self.retry.run("delete", || self.cluster.delete(&key)).await;
                match result {
                    Ok(DeleteOutcome::Deleted) => {
                        ResourceReport::new(resource, ResourceStatus::Deleted, attempts)
                    }
                    Ok(DeleteOutcome::NotFound) => {
                        ResourceReport::new(resource, ResourceStatus::Absent, attempts)
                    }
                    Err(e) => ResourceReport::failed(resource, &e, attempts),
                }
            }
            DeployMode::ForceInstall => {
                let (deleted, mut attempts) =
                    self.retry.run("delete", || self.cluster.delete(&key)).await;
                let existed = match deleted {
                    Ok(outcome) => outcome == DeleteOutcome::Deleted,
                    Err(e) => return ResourceReport::failed(resource, &e, attempts),
                };

                if existed {
                    attempts += 1;
                    if let Err(e) = self.cluster.wait_deleted(&key, DEFAULT_DELETE_TIMEOUT).await {
                        return ResourceReport::failed(resource, &e, attempts);
                    }
                }

                let (applied, apply_attempts) = self
                    .retry
                    .run("apply", || self.cluster.apply(resource))
                    .await;
                attempts += apply_attempts;
                match applied {
                    Ok(_) if existed => {
                        ResourceReport::new(resource, ResourceStatus::Recreated, attempts)
                    }
                    Ok(_) => ResourceReport::new(resource, ResourceStatus::Created, attempts),
                    Err(e) => ResourceReport::failed(resource, &e, attempts),
                }
            }
        }
    }
}
