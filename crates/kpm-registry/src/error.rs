//! Error types for registry operations

use thiserror::Error;

/// Registry operation errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    // ============ Lookup Errors ============
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("No version given for {name} and the registry reports no default")]
    AmbiguousVersion { name: String },

    #[error("Invalid package {name}: {message}")]
    InvalidPackage { name: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out")]
    Timeout,

    // ============ Configuration Errors ============
    #[error("Invalid registry URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Other ============
    #[error(transparent)]
    Core(#[from] kpm_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RegistryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Worth retrying: timeouts, connection failures, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RegistryError::Timeout
        } else if e.is_connect() {
            RegistryError::Network {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RegistryError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            RegistryError::Serialization(e.to_string())
        } else {
            RegistryError::Network {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RegistryError {
    fn from(e: serde_yaml::Error) -> Self {
        RegistryError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(e: url::ParseError) -> Self {
        RegistryError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<semver::Error> for RegistryError {
    fn from(e: semver::Error) -> Self {
        RegistryError::Serialization(format!("Invalid version: {}", e))
    }
}
