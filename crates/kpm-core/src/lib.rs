//! kpm Core - Core types for the Kubernetes package manager
//!
//! This crate provides the foundational types used throughout kpm:
//! - `Manifest`: The package definition (metadata, variables, resource templates)
//! - `Variables`: Variable contexts with deep merge support
//! - `ShardSpec`: Shard topology and its expansion into per-shard contexts
//! - `Resource`: A rendered Kubernetes document tagged with its shard
//! - `archive`: Packing a source tree into a blob and back

pub mod archive;
pub mod error;
pub mod package;
pub mod resource;
pub mod shard;
pub mod values;

pub use error::{CoreError, Result};
pub use package::{Manifest, Package, PackageInfo, PackageName, ResourceTemplate, VariableSpec};
pub use resource::{Resource, ResourceKey};
pub use shard::{Shard, ShardContext, ShardSpec, expand};
pub use values::{Variables, parse_overrides};
