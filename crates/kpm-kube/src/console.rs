//! Run a command in a workload's pod

use crate::cluster::{Cluster, ExecOutput, OwnerKind};
use crate::error::{KubeError, Result};

/// Find the pods of `kind/name` and execute `command` in the first one
pub async fn exec_in_first_pod(
    cluster: &dyn Cluster,
    kind: &str,
    name: &str,
    namespace: &str,
    container: Option<&str>,
    command: &[String],
) -> Result<ExecOutput> {
    let owner = OwnerKind::parse(kind)?;
    let pods = cluster.find_pods(owner, name, namespace).await?;
    let pod = pods.first().ok_or_else(|| KubeError::NoPods {
        kind: owner.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
    })?;

    tracing::debug!(pod = %pod.name, ?container, "exec {:?}", command);
    cluster.exec(pod, container, command).await
}
