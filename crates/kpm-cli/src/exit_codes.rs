//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - bad variables, shard specification or arguments
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Package error - invalid package structure or manifest.yaml
pub const PACKAGE_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Cluster error - one or more resources failed to reconcile
pub const CLUSTER_ERROR: i32 = 6;

/// Registry error - package, version or channel lookup failed
pub const REGISTRY_ERROR: i32 = 7;
