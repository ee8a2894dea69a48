//! Hot reload
//!
//! - [`manager`] the reload orchestrator front ends talk to
//! - [`registry`] probes the host and adapts its storage layout
//! - [`unregister`] strips a module from the registry
//! - [`loader`] reads manifests out of archives
//! - [`watcher`] polls archive timestamps

pub mod archive;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod unregister;
pub mod watcher;

pub use archive::{write_archive, write_archive_with};
pub use loader::{DEFAULT_EXTENSION, DescriptorLoader, LoadError, MANIFEST_ENTRY};
pub use manager::{
    DENIED_MESSAGE, ModuleFailure, PendingReload, ReloadEvent, ReloadKind, ReloadOrchestrator,
    ReloadOrchestratorBuilder, ReloadOutcome,
};
pub use registry::{
    FlatRegistry, NestedRegistry, StorageRegistry, UnavailableRegistry, locate_registry,
};
pub use unregister::{UnregisterReport, unregister};
pub use watcher::{
    AutoReloadWatcher, WatchEvent, WatchEventKind, WatchSink, WatchState, WatcherHandle,
};
