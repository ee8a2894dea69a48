//! fastswap runtime
//!
//! Replaces loaded modules in place:
//! - [`hot_reload`] orchestration, registry adapters, descriptor loading and the watcher
//! - [`primary`] the single-writer primary thread
//! - [`trigger`] command and chat front ends
//! - [`host`] an embedded reference host with flat and nested storage layouts

pub mod host;
pub mod hot_reload;
pub mod primary;
pub mod trigger;

pub use fastswap_kernel::{
    Module, ModuleHost, ModuleManifest, ModuleRef, Notice, RegistryHandle, RegistryVariant,
    ReloadError, ReloadPolicy, ReloadResult, Requester,
};
pub use host::{EmbeddedHost, HostLayout};
pub use hot_reload::{
    DescriptorLoader, PendingReload, ReloadEvent, ReloadOrchestrator, ReloadOutcome,
};
pub use primary::PrimaryThread;
pub use trigger::{ChatTrigger, CommandTrigger, ConfigReloadCommand};
