//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`] at the command boundary so
//! `main` can print one diagnostic and exit with a code that tells scripts
//! which stage failed.

use kpm_core::CoreError;
use kpm_engine::EngineError;
use kpm_kube::{KubeError, ReconcileReport};
use kpm_registry::RegistryError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Bad arguments, variables or shard specification
    #[error("Validation failed: {message}")]
    #[diagnostic(code(kpm::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Rendering failed; keeps the engine's source-annotated diagnostic
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(EngineError),

    /// Package structure, manifest or archive error
    #[error("Package error: {message}")]
    #[diagnostic(code(kpm::cli::package))]
    Package {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kpm::cli::io))]
    Io { message: String },

    /// Cluster connection or operation error
    #[error("Cluster error: {message}")]
    #[diagnostic(code(kpm::cli::cluster))]
    Cluster { message: String },

    /// Some resources did not reconcile
    #[error("Reconcile incomplete: {summary}")]
    #[diagnostic(code(kpm::cli::reconcile))]
    Reconcile {
        summary: String,
        #[help]
        help: String,
    },

    /// Registry lookup or write error
    #[error("Registry error: {message}")]
    #[diagnostic(code(kpm::cli::registry))]
    Registry {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(kpm::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Template(_) => exit_codes::TEMPLATE_ERROR,
            CliError::Package { .. } => exit_codes::PACKAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cluster { .. } | CliError::Reconcile { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Registry { .. } => exit_codes::REGISTRY_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Error for a reconcile report that is not fully successful
    pub fn reconcile(report: &ReconcileReport) -> Self {
        let help = if report.was_cancelled() {
            "interrupted; re-run the same command to process the remaining resources"
        } else {
            "re-run the same command to retry; resources already applied are left in place"
        };
        Self::Reconcile {
            summary: report.summary(),
            help: help.to_string(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidShardSpec { .. }
            | CoreError::InvalidVariable { .. }
            | CoreError::InvalidPackageName { .. } => CliError::Validation {
                message: err.to_string(),
                help: None,
            },
            CoreError::Extract { .. } => CliError::Io {
                message: err.to_string(),
            },
            CoreError::Io(e) => e.into(),
            CoreError::ManifestNotFound { .. } => CliError::Package {
                message: err.to_string(),
                help: Some("create one with `kpm new <namespace/name>`".to_string()),
            },
            other => CliError::Package {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(e) => e.into(),
            other => CliError::Template(other),
        }
    }
}

impl From<RegistryError> for CliError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Core(e) => e.into(),
            RegistryError::Io(e) => e.into(),
            RegistryError::InvalidConfig { .. } | RegistryError::InvalidUrl { .. } => {
                CliError::Validation {
                    message: err.to_string(),
                    help: None,
                }
            }
            RegistryError::AmbiguousVersion { .. } => CliError::Registry {
                message: err.to_string(),
                help: Some("pass --version or --channel".to_string()),
            },
            RegistryError::Conflict { .. } => CliError::Registry {
                message: err.to_string(),
                help: Some("use --force to overwrite".to_string()),
            },
            other => CliError::Registry {
                help: other
                    .is_transient()
                    .then(|| "the registry may be temporarily unavailable; try again".to_string()),
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Core(e) => e.into(),
            KubeError::Engine(e) => e.into(),
            KubeError::Registry(e) => e.into(),
            KubeError::Io(e) => e.into(),
            KubeError::UnsupportedOwner(_) => CliError::Validation {
                message: err.to_string(),
                help: None,
            },
            other => CliError::Cluster {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
