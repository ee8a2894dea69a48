use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

pub mod manifest;
pub use manifest::{CommandSpec, DEFAULT_API_VERSION, ModuleManifest, PermissionSpec};

/// Shared handle to a loaded module instance.
pub type ModuleRef = Arc<Module>;

/// A loaded module instance
///
/// Identity is the declared name, but every load produces a fresh instance
/// with its own [`Module::instance_id`]; a reloaded module is never the same
/// object that was disabled.
pub struct Module {
    /// Parsed descriptor
    manifest: ModuleManifest,
    /// Backing archive file
    archive: PathBuf,
    /// Instance ID
    instance_id: Uuid,
    /// Enabled flag
    enabled: AtomicBool,
}

impl Module {
    /// Create a new, disabled module instance
    pub fn new(manifest: ModuleManifest, archive: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            archive: archive.into(),
            instance_id: Uuid::now_v7(),
            enabled: AtomicBool::new(false),
        }
    }

    /// Declared module name
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Parsed descriptor
    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    /// Backing archive file
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Per-load instance ID
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Whether the host has enabled this instance
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip the enabled flag. Only hosts call this.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Prefix used for namespaced command labels (`prefix:label`).
    pub fn fallback_prefix(&self) -> String {
        self.manifest.name.to_lowercase().trim().to_string()
    }

    /// Qualified form of a command label for this module.
    pub fn qualified(&self, label: &str) -> String {
        format!("{}:{}", self.fallback_prefix(), label)
    }

    /// Every key this module occupies in the lookup table.
    pub fn lookup_keys(&self) -> Vec<String> {
        std::iter::once(self.manifest.name.as_str())
            .chain(self.manifest.provides.iter().map(String::as_str))
            .map(lookup_key)
            .collect()
    }

    /// Whether both handles point at the same loaded instance.
    pub fn same_instance(&self, other: &Module) -> bool {
        self.instance_id == other.instance_id
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("archive", &self.archive)
            .field("instance_id", &self.instance_id)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Normalize a name for the case-insensitive lookup table.
pub fn lookup_key(name: &str) -> String {
    name.to_lowercase()
}
