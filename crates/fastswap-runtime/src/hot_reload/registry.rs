//! Registry adapters
//!
//! Locates the host's bookkeeping through [`ModuleHost::internal`] and wraps
//! it in a [`RegistryHandle`]. Callers never see which layout is behind the
//! handle.

use std::sync::Arc;

use tracing::{debug, warn};

use fastswap_kernel::{
    CommandBinding, HostError, Module, ModuleHost, ModuleRef, Permission, RegistryHandle,
    RegistryVariant, lookup_key,
};

use crate::host::storage::{
    FLAT_MANAGER_KEY, LAYERED_MANAGER_KEY, LayeredModuleManager, SimpleModuleManager,
    StorageLayout,
};

/// Registry adapter over a concrete storage layout.
pub struct StorageRegistry<L: StorageLayout> {
    storage: Arc<L>,
    host: Arc<dyn ModuleHost>,
}

/// Adapter for hosts whose tables hang off one manager
pub type FlatRegistry = StorageRegistry<SimpleModuleManager>;

/// Adapter for hosts that split tables across sub-managers
pub type NestedRegistry = StorageRegistry<LayeredModuleManager>;

impl<L: StorageLayout> StorageRegistry<L> {
    /// Wrap located storage. `host` receives [`RegistryHandle::resync`] calls.
    pub fn new(storage: Arc<L>, host: Arc<dyn ModuleHost>) -> Self {
        Self { storage, host }
    }
}

impl<L: StorageLayout> RegistryHandle for StorageRegistry<L> {
    fn variant(&self) -> RegistryVariant {
        L::VARIANT
    }

    fn list_modules(&self) -> Vec<ModuleRef> {
        self.storage.tables().modules.read().clone()
    }

    fn remove_module(&self, module: &Module) -> bool {
        let tables = self.storage.tables();
        let mut modules = tables.modules.write();
        let before = modules.len();
        modules.retain(|m| !m.same_instance(module));
        modules.len() != before
    }

    fn lookup(&self, name: &str) -> Option<ModuleRef> {
        self.storage
            .tables()
            .lookup_names
            .read()
            .get(&lookup_key(name))
            .cloned()
    }

    fn remove_lookup_name(&self, name: &str) -> Option<ModuleRef> {
        self.storage
            .tables()
            .lookup_names
            .write()
            .remove(&lookup_key(name))
    }

    fn command_binding(&self, label: &str) -> Option<Arc<CommandBinding>> {
        self.storage.tables().command_map.read().get(label).cloned()
    }

    fn command_entries(&self) -> Vec<(String, Arc<CommandBinding>)> {
        self.storage
            .tables()
            .command_map
            .read()
            .iter()
            .map(|(label, binding)| (label.clone(), Arc::clone(binding)))
            .collect()
    }

    fn install_command(
        &self,
        label: &str,
        binding: Arc<CommandBinding>,
    ) -> Option<Arc<CommandBinding>> {
        self.storage
            .tables()
            .command_map
            .write()
            .insert(label.to_string(), binding)
    }

    fn remove_command_binding(&self, label: &str) -> Option<Arc<CommandBinding>> {
        self.storage.tables().command_map.write().remove(label)
    }

    fn permission(&self, name: &str) -> Option<Permission> {
        self.storage.tables().permissions.read().get(name).cloned()
    }

    fn remove_permission(&self, name: &str) -> Option<Permission> {
        self.storage.tables().permissions.write().remove(name)
    }

    fn default_bucket(&self, operator: bool) -> Vec<Permission> {
        let mut bucket: Vec<_> = self
            .storage
            .tables()
            .default_perms
            .read()
            .bucket(operator)
            .iter()
            .cloned()
            .collect();
        bucket.sort_by(|a, b| a.name.cmp(&b.name));
        bucket
    }

    fn remove_from_default_bucket(&self, operator: bool, permission: &Permission) -> bool {
        self.storage
            .tables()
            .default_perms
            .write()
            .bucket_mut(operator)
            .remove(permission)
    }

    fn resync(&self) -> Result<(), HostError> {
        self.host.sync_commands()
    }
}

/// Stand-in used when storage could not be located. Every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRegistry;

impl RegistryHandle for UnavailableRegistry {
    fn variant(&self) -> RegistryVariant {
        RegistryVariant::Unavailable
    }

    fn list_modules(&self) -> Vec<ModuleRef> {
        Vec::new()
    }

    fn remove_module(&self, _module: &Module) -> bool {
        false
    }

    fn lookup(&self, _name: &str) -> Option<ModuleRef> {
        None
    }

    fn remove_lookup_name(&self, _name: &str) -> Option<ModuleRef> {
        None
    }

    fn command_binding(&self, _label: &str) -> Option<Arc<CommandBinding>> {
        None
    }

    fn command_entries(&self) -> Vec<(String, Arc<CommandBinding>)> {
        Vec::new()
    }

    fn install_command(
        &self,
        _label: &str,
        _binding: Arc<CommandBinding>,
    ) -> Option<Arc<CommandBinding>> {
        None
    }

    fn remove_command_binding(&self, _label: &str) -> Option<Arc<CommandBinding>> {
        None
    }

    fn permission(&self, _name: &str) -> Option<Permission> {
        None
    }

    fn remove_permission(&self, _name: &str) -> Option<Permission> {
        None
    }

    fn default_bucket(&self, _operator: bool) -> Vec<Permission> {
        Vec::new()
    }

    fn remove_from_default_bucket(&self, _operator: bool, _permission: &Permission) -> bool {
        false
    }

    fn resync(&self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Probe the host for a known storage layout.
///
/// The layered manager is tried first since hosts that carry it may still
/// expose a legacy flat manager for compatibility. A key that is present but
/// holds an unexpected type yields [`UnavailableRegistry`].
pub fn locate_registry(host: Arc<dyn ModuleHost>) -> Arc<dyn RegistryHandle> {
    if let Some(internal) = host.internal(LAYERED_MANAGER_KEY) {
        return match internal.downcast::<LayeredModuleManager>() {
            Ok(storage) => {
                debug!("Located nested module storage");
                Arc::new(NestedRegistry::new(storage, host))
            }
            Err(_) => {
                warn!(key = LAYERED_MANAGER_KEY, "Host internal has an unexpected type");
                Arc::new(UnavailableRegistry)
            }
        };
    }

    match host.internal(FLAT_MANAGER_KEY) {
        Some(internal) => match internal.downcast::<SimpleModuleManager>() {
            Ok(storage) => {
                debug!("Located flat module storage");
                Arc::new(FlatRegistry::new(storage, host))
            }
            Err(_) => {
                warn!(key = FLAT_MANAGER_KEY, "Host internal has an unexpected type");
                Arc::new(UnavailableRegistry)
            }
        },
        None => Arc::new(UnavailableRegistry),
    }
}
