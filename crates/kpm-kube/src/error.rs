//! Error types for kpm-kube

use std::time::Duration;

use thiserror::Error;

/// Result type for kpm-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// How a failed cluster operation should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying (timeouts, connection failures, 429, 5xx)
    Transient,
    /// The existing object cannot take the change (immutable field, 409)
    Conflict,
    NotFound,
    Permanent,
}

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Failure reported by a cluster backend with an explicit class
    #[error("{message}")]
    Cluster { class: ErrorClass, message: String },

    /// apiVersion/kind not served by the cluster
    #[error("unknown resource type {api_version}/{kind}")]
    UnknownKind { api_version: String, kind: String },

    #[error("unsupported owner kind '{0}' (expected deployment, rs/replicaset or rc/replicationcontroller)")]
    UnsupportedOwner(String),

    #[error("{kind}/{name} in namespace '{namespace}' has no pods")]
    NoPods {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("exec failed: {0}")]
    Exec(String),

    /// Timeout
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("no {0} configured")]
    NotConfigured(&'static str),

    /// Package resolution error
    #[error(transparent)]
    Registry(#[from] kpm_registry::RegistryError),

    /// Template rendering error
    #[error(transparent)]
    Engine(#[from] kpm_engine::EngineError),

    /// Package, variable or shard error
    #[error(transparent)]
    Core(#[from] kpm_core::CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Cluster {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Cluster {
            class: ErrorClass::Conflict,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Cluster {
            class: ErrorClass::Permanent,
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            KubeError::Cluster { class, .. } => *class,
            KubeError::Api(kube::Error::Api(resp)) => match resp.code {
                404 => ErrorClass::NotFound,
                409 => ErrorClass::Conflict,
                422 if resp.message.contains("immutable") => ErrorClass::Conflict,
                429 | 500.. => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            },
            KubeError::Api(kube::Error::HyperError(_) | kube::Error::Service(_)) => {
                ErrorClass::Transient
            }
            KubeError::Timeout { .. } => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.class() == ErrorClass::Conflict
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api(code: u16, message: &str) -> KubeError {
        KubeError::Api(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        }))
    }

    #[test]
    fn test_api_error_classification() {
        assert_eq!(api(404, "not found").class(), ErrorClass::NotFound);
        assert_eq!(api(409, "conflict").class(), ErrorClass::Conflict);
        assert_eq!(
            api(422, "spec.selector: Invalid value: field is immutable").class(),
            ErrorClass::Conflict
        );
        assert_eq!(api(422, "spec.replicas: must be positive").class(), ErrorClass::Permanent);
        assert_eq!(api(429, "slow down").class(), ErrorClass::Transient);
        assert_eq!(api(503, "unavailable").class(), ErrorClass::Transient);
        assert_eq!(api(403, "forbidden").class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_explicit_classes() {
        assert!(KubeError::transient("connection reset").is_transient());
        assert!(KubeError::conflict("immutable").is_conflict());
        assert_eq!(KubeError::permanent("bad").class(), ErrorClass::Permanent);
        assert_eq!(KubeError::Cancelled.class(), ErrorClass::Permanent);
    }
}
