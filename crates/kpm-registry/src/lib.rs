//! kpm Registry - package and channel access
//!
//! This crate provides:
//! - `Registry`: the registry collaborator trait
//! - `HttpRegistry`: the REST client used by the CLI
//! - `MemoryRegistry`: an in-memory registry for tests and offline use
//! - `PackageResolver`: name + version selector to a fetched `Package`
//! - `ChannelManager`: idempotent channel release management
//! - `KpmConfig`: client configuration (`~/.config/kpm/config.yaml`)

pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod registry;
pub mod resolver;

pub use channel::ChannelManager;
pub use config::{KpmConfig, RetrySettings};
pub use error::{RegistryError, Result};
pub use http::HttpRegistry;
pub use memory::{MemoryRegistry, OperationCounts};
pub use registry::{Channel, ChannelRelease, PackageFilter, PackageSummary, Registry};
pub use resolver::{PackageRef, PackageResolver, VersionSelector};
