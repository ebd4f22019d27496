//! Client configuration
//!
//! Stored in `~/.config/kpm/config.yaml`. Command-line flags and environment
//! variables override the file; the file overrides the built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RegistryError, Result};

/// Registry used when nothing else is configured
pub const DEFAULT_REGISTRY: &str = "https://api.kpm.sh";

/// Namespace used when nothing else is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Steepest backoff growth accepted in a config file
pub const MAX_MULTIPLIER: f64 = 10.0;

/// Retry settings for cluster operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// The `kpm` configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KpmConfig {
    /// Registry endpoint
    pub registry: String,

    /// Target namespace when none is given
    pub namespace: String,

    pub retry: RetrySettings,

    /// Registry request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for KpmConfig {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            retry: RetrySettings::default(),
            timeout: crate::http::DEFAULT_TIMEOUT,
        }
    }
}

impl KpmConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            RegistryError::InvalidConfig {
                message: format!("{}: {}", path.display(), e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RegistryError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("kpm").join("config.yaml"))
    }

    /// Apply flag or environment values over the file
    pub fn with_overrides(mut self, registry: Option<&str>, namespace: Option<&str>) -> Self {
        if let Some(registry) = registry {
            self.registry = registry.to_string();
        }
        if let Some(namespace) = namespace {
            self.namespace = namespace.to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(RegistryError::InvalidConfig {
                message: "retry.maxAttempts must be at least 1".to_string(),
            });
        }
        if !(1.0..=MAX_MULTIPLIER).contains(&self.retry.multiplier) {
            return Err(RegistryError::InvalidConfig {
                message: format!(
                    "retry.multiplier must be between 1.0 and {}",
                    MAX_MULTIPLIER
                ),
            });
        }
        Ok(())
    }
}
