//! fastswap kernel
//!
//! Host-agnostic contracts for replacing loaded modules in place:
//! - [`Module`] / [`ModuleManifest`] data model
//! - [`RegistryHandle`] capability over the host's internal bookkeeping
//! - [`ModuleHost`] native lifecycle calls
//! - [`PrimaryScheduler`] single-writer hand-off
//! - [`ReloadPolicy`] immutable policy snapshots

// error module
pub mod error;
pub use error::*;

// module model
pub mod module;
pub use module::*;

// registry capability
pub mod registry;
pub use registry::*;

// host contracts
pub mod host;
pub use host::*;

// primary thread scheduling
pub mod scheduler;
pub use scheduler::*;

// reload policy
pub mod policy;
pub use policy::*;

// configuration loading
#[cfg(feature = "config")]
pub mod config;
