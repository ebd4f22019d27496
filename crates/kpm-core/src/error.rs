//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("Invalid package name '{name}': {reason}")]
    InvalidPackageName { name: String, reason: String },

    #[error("Invalid manifest.yaml: {message}")]
    InvalidManifest { message: String },

    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: String },

    #[error("Template '{name}' not found at {path}")]
    TemplateNotFound { name: String, path: String },

    #[error("Invalid shard specification: {message}")]
    InvalidShardSpec { message: String },

    #[error("Invalid variable override: {message}")]
    InvalidVariable { message: String },

    #[error("Cannot extract package into {}: directory exists and is not empty (use overwrite)", path.display())]
    Extract { path: PathBuf },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
