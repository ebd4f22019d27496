//! In-memory cluster for testing
//!
//! Objects live in a map keyed by [`ResourceKey`]. Faults can be injected per
//! object and every call is recorded in an operation log.

use async_trait::async_trait;
use kpm_core::{Resource, ResourceKey};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::{ApplyOutcome, Cluster, DeleteOutcome, ExecOutput, OwnerKind, PodRef};
use crate::error::{KubeError, Result};

/// Injected failure for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The next `remaining` apply/delete calls fail with a transient error
    Transient { remaining: usize },
    /// Every apply/delete call fails with a permanent error
    Permanent,
    /// Applying over an existing object fails with an immutable-field conflict
    Immutable,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOp {
    Apply(ResourceKey),
    Delete(ResourceKey),
    WaitDeleted(ResourceKey),
    FindPods { owner: String, namespace: String },
    Exec { pod: String, command: Vec<String> },
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceKey, JsonValue>,
    faults: HashMap<ResourceKey, Fault>,
    pods: HashMap<(OwnerKind, String, String), Vec<PodRef>>,
    exec_output: Option<ExecOutput>,
    log: Vec<ClusterOp>,
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<RwLock<State>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-existing objects
    pub fn with_objects(resources: &[Resource]) -> Self {
        let cluster = Self::new();
        {
            let mut state = write(&cluster.state);
            for resource in resources {
                state.objects.insert(resource.key(), resource.body.clone());
            }
        }
        cluster
    }

    pub fn inject(&self, key: ResourceKey, fault: Fault) {
        write(&self.state).faults.insert(key, fault);
    }

    /// Register the pods owned by a workload
    pub fn add_pods(&self, owner: OwnerKind, name: &str, namespace: &str, pods: Vec<PodRef>) {
        write(&self.state)
            .pods
            .insert((owner, name.to_string(), namespace.to_string()), pods);
    }

    /// Output returned by every `exec`; defaults to echoing the command
    pub fn set_exec_output(&self, output: ExecOutput) {
        write(&self.state).exec_output = Some(output);
    }

    pub fn get(&self, key: &ResourceKey) -> Option<JsonValue> {
        read(&self.state).objects.get(key).cloned()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        read(&self.state).objects.contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        read(&self.state).objects.len()
    }

    /// Every call made so far, in order
    pub fn log(&self) -> Vec<ClusterOp> {
        read(&self.state).log.clone()
    }

    /// Number of calls of any kind
    pub fn call_count(&self) -> usize {
        read(&self.state).log.len()
    }

    /// Consume a transient fault or report a permanent one
    fn check_fault(state: &mut State, key: &ResourceKey) -> Result<()> {
        match state.faults.get_mut(key) {
            Some(Fault::Transient { remaining }) if *remaining > 0 => {
                *remaining -= 1;
                Err(KubeError::transient(format!("{}: connection reset by peer", key)))
            }
            Some(Fault::Permanent) => Err(KubeError::permanent(format!(
                "{}: admission webhook denied the request",
                key
            ))),
            _ => Ok(()),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn apply(&self, resource: &Resource) -> Result<ApplyOutcome> {
        let key = resource.key();
        let mut state = write(&self.state);
        state.log.push(ClusterOp::Apply(key.clone()));
        Self::check_fault(&mut state, &key)?;

        let exists = state.objects.contains_key(&key);
        if exists && state.faults.get(&key) == Some(&Fault::Immutable) {
            return Err(KubeError::conflict(format!(
                "{}: field is immutable",
                key
            )));
        }

        state.objects.insert(key, resource.body.clone());
        Ok(if exists {
            ApplyOutcome::Updated
        } else {
            ApplyOutcome::Created
        })
    }

    async fn delete(&self, key: &ResourceKey) -> Result<DeleteOutcome> {
        let mut state = write(&self.state);
        state.log.push(ClusterOp::Delete(key.clone()));
        Self::check_fault(&mut state, key)?;

        Ok(match state.objects.remove(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn wait_deleted(&self, key: &ResourceKey, timeout: Duration) -> Result<()> {
        let mut state = write(&self.state);
        state.log.push(ClusterOp::WaitDeleted(key.clone()));
        if state.objects.contains_key(key) {
            return Err(KubeError::Timeout {
                what: format!("deletion of {}", key),
                after: timeout,
            });
        }
        Ok(())
    }

    async fn find_pods(
        &self,
        owner: OwnerKind,
        owner_name: &str,
        namespace: &str,
    ) -> Result<Vec<PodRef>> {
        let mut state = write(&self.state);
        state.log.push(ClusterOp::FindPods {
            owner: format!("{}/{}", owner, owner_name),
            namespace: namespace.to_string(),
        });
        Ok(state
            .pods
            .get(&(owner, owner_name.to_string(), namespace.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn exec(
        &self,
        pod: &PodRef,
        _container: Option<&str>,
        command: &[String],
    ) -> Result<ExecOutput> {
        let mut state = write(&self.state);
        state.log.push(ClusterOp::Exec {
            pod: pod.name.clone(),
            command: command.to_vec(),
        });
        Ok(state.exec_output.clone().unwrap_or_else(|| ExecOutput {
            exit_code: 0,
            stdout: format!("{}\n", command.join(" ")),
            stderr: String::new(),
        }))
    }
}
