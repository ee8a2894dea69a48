//! Embedded reference host
//!
//! A small in-process host that keeps its bookkeeping in one of the two
//! storage layouts, so both registry adapters run against real tables.
//! Module archives are zip files carrying a `module.yml` manifest.

pub mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use fastswap_kernel::{
    CommandBinding, HostError, HostInternal, Module, ModuleHost, ModuleRef, lookup_key,
};

use crate::hot_reload::loader::DescriptorLoader;
use storage::{
    FLAT_MANAGER_KEY, LAYERED_MANAGER_KEY, LayeredModuleManager, SimpleModuleManager,
    StorageLayout, Tables,
};

/// Highest module API version this host implements.
pub const HOST_API_VERSION: u32 = 1;

/// Storage layout used by an [`EmbeddedHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostLayout {
    /// Tables on one manager
    #[default]
    Flat,
    /// Tables split across sub-managers
    Nested,
}

impl HostLayout {
    /// Parse `flat` / `nested` (any case)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "flat" => Some(Self::Flat),
            "nested" | "layered" => Some(Self::Nested),
            _ => None,
        }
    }
}

enum HostStorage {
    Flat(Arc<SimpleModuleManager>),
    Nested(Arc<LayeredModuleManager>),
}

impl HostStorage {
    fn tables(&self) -> Tables<'_> {
        match self {
            HostStorage::Flat(manager) => manager.tables(),
            HostStorage::Nested(manager) => manager.tables(),
        }
    }
}

/// Result of loading every archive in the module directory.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// Modules loaded and enabled, in load order
    pub loaded: Vec<String>,
    /// Archives that could not be loaded or enabled
    pub failures: Vec<(PathBuf, HostError)>,
}

/// In-process host over a module directory.
pub struct EmbeddedHost {
    layout: HostLayout,
    storage: HostStorage,
    loader: DescriptorLoader,
    command_syncs: AtomicUsize,
}

impl EmbeddedHost {
    /// Create an empty host over `modules_dir`
    pub fn new(layout: HostLayout, modules_dir: impl Into<PathBuf>) -> Self {
        let storage = match layout {
            HostLayout::Flat => HostStorage::Flat(Arc::new(SimpleModuleManager::default())),
            HostLayout::Nested => HostStorage::Nested(Arc::new(LayeredModuleManager::default())),
        };
        Self {
            layout,
            storage,
            loader: DescriptorLoader::new(modules_dir),
            command_syncs: AtomicUsize::new(0),
        }
    }

    /// Storage layout
    pub fn layout(&self) -> HostLayout {
        self.layout
    }

    /// Module directory
    pub fn modules_dir(&self) -> &Path {
        self.loader.directory()
    }

    /// How many times the command table was pushed to dispatch
    pub fn command_syncs(&self) -> usize {
        self.command_syncs.load(Ordering::Relaxed)
    }

    /// Loaded modules in load order
    pub fn modules(&self) -> Vec<ModuleRef> {
        self.storage.tables().modules.read().clone()
    }

    /// Module by lookup name (case-insensitive)
    pub fn module(&self, name: &str) -> Option<ModuleRef> {
        self.storage
            .tables()
            .lookup_names
            .read()
            .get(&lookup_key(name))
            .cloned()
    }

    /// Binding dispatched for `label`, if it is still registered
    pub fn dispatch(&self, label: &str) -> Option<Arc<CommandBinding>> {
        self.storage
            .tables()
            .command_map
            .read()
            .get(label)
            .filter(|binding| binding.is_registered())
            .cloned()
    }

    /// Load and enable every archive in the module directory.
    ///
    /// Archives whose hard dependencies are not loaded yet are retried after
    /// the others, until a pass makes no progress.
    pub fn bootstrap(&self) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        let mut pending = match self.loader.list_archives() {
            Ok(archives) => archives,
            Err(e) => {
                warn!("Failed to list module directory {:?}: {}", self.modules_dir(), e);
                return report;
            }
        };

        loop {
            let mut deferred = Vec::new();
            let mut progressed = false;

            for archive in pending {
                match self.load_module(&archive) {
                    Ok(module) => {
                        progressed = true;
                        match self.enable_module(&module) {
                            Ok(()) => report.loaded.push(module.name().to_string()),
                            Err(e) => report.failures.push((archive, e)),
                        }
                    }
                    Err(e @ HostError::UnknownDependency { .. }) => deferred.push((archive, e)),
                    Err(e) => report.failures.push((archive, e)),
                }
            }

            if deferred.is_empty() || !progressed {
                report.failures.extend(deferred);
                break;
            }
            pending = deferred.into_iter().map(|(archive, _)| archive).collect();
        }

        for (archive, e) in &report.failures {
            warn!("Could not load {:?}: {}", archive, e);
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "Host bootstrap complete"
        );
        report
    }

    /// Add an alias to a module's command at runtime, the way a module may
    /// do from its own code after it was enabled.
    pub fn register_runtime_alias(
        &self,
        module: &Module,
        label: &str,
        alias: &str,
    ) -> Result<(), HostError> {
        let tables = self.storage.tables();
        let mut commands = tables.command_map.write();
        let binding = commands
            .get(&module.qualified(label))
            .filter(|b| b.is_owned_by(module.name()))
            .cloned()
            .ok_or_else(|| {
                HostError::Other(format!("{} has no command `{}`", module.name(), label))
            })?;

        binding.add_alias(alias);
        commands
            .entry(alias.to_string())
            .or_insert_with(|| Arc::clone(&binding));
        commands.insert(module.qualified(alias), binding);
        Ok(())
    }

    /// Register a command the manifest does not declare.
    pub fn register_runtime_command(&self, module: &Module, label: &str) -> Arc<CommandBinding> {
        let binding = Arc::new(CommandBinding::new(label, module.name()));
        let tables = self.storage.tables();
        let mut commands = tables.command_map.write();
        commands
            .entry(label.to_string())
            .or_insert_with(|| Arc::clone(&binding));
        commands.insert(module.qualified(label), Arc::clone(&binding));
        binding
    }

    fn register_commands(&self, module: &Module) {
        let tables = self.storage.tables();
        let mut commands = tables.command_map.write();

        for (label, spec) in &module.manifest().commands {
            let binding = Arc::new(
                CommandBinding::new(label, module.name())
                    .with_aliases(spec.aliases.iter().cloned())
                    .with_description(spec.description.clone())
                    .with_permission(spec.permission.clone()),
            );

            for key in std::iter::once(label).chain(spec.aliases.iter()) {
                // Plain labels are first come, first served; the qualified
                // form always reaches this module.
                if commands.contains_key(key.as_str()) {
                    debug!(
                        module = %module.name(),
                        "Label `{}` is taken, using fallback only", key
                    );
                } else {
                    commands.insert(key.clone(), Arc::clone(&binding));
                }
                commands.insert(module.qualified(key), Arc::clone(&binding));
            }
        }
    }

    fn register_permissions(&self, module: &Module) {
        let tables = self.storage.tables();
        let mut permissions = tables.permissions.write();
        let mut defaults = tables.default_perms.write();

        for permission in module.manifest().declared_permissions() {
            for operator in [true, false] {
                if permission.default.applies_to(operator) {
                    defaults.bucket_mut(operator).insert(permission.clone());
                }
            }
            permissions.insert(permission.name.clone(), permission);
        }
    }
}

impl ModuleHost for EmbeddedHost {
    fn load_module(&self, archive: &Path) -> Result<ModuleRef, HostError> {
        let manifest =
            self.loader
                .parse_manifest(archive)
                .map_err(|e| HostError::InvalidArchive {
                    path: archive.to_path_buf(),
                    reason: e.to_string(),
                })?;

        if manifest.entry.trim().is_empty() {
            return Err(HostError::MissingEntryPoint {
                module: manifest.name,
            });
        }
        if manifest.api_version > HOST_API_VERSION {
            return Err(HostError::IncompatibleVersion {
                module: manifest.name,
                required: manifest.api_version,
                provided: HOST_API_VERSION,
            });
        }

        let module = Arc::new(Module::new(manifest, archive));
        let tables = self.storage.tables();
        let mut lookup = tables.lookup_names.write();

        if let Some(taken) = module.lookup_keys().into_iter().find(|k| lookup.contains_key(k)) {
            return Err(HostError::DuplicateName(taken));
        }
        if let Some(missing) = module
            .manifest()
            .depend
            .iter()
            .find(|dep| !lookup.contains_key(&lookup_key(dep)))
        {
            return Err(HostError::UnknownDependency {
                module: module.name().to_string(),
                dependency: missing.clone(),
            });
        }

        for key in module.lookup_keys() {
            lookup.insert(key, Arc::clone(&module));
        }
        drop(lookup);
        tables.modules.write().push(Arc::clone(&module));

        info!(module = %module.name(), version = %module.manifest().version, "Loaded module");
        Ok(module)
    }

    fn enable_module(&self, module: &ModuleRef) -> Result<(), HostError> {
        if module.is_enabled() {
            return Ok(());
        }
        self.register_commands(module);
        self.register_permissions(module);
        module.set_enabled(true);
        self.sync_commands()?;
        info!(module = %module.name(), "Enabled module");
        Ok(())
    }

    fn disable_module(&self, module: &ModuleRef) -> Result<(), HostError> {
        if module.is_enabled() {
            module.set_enabled(false);
            info!(module = %module.name(), "Disabled module");
        }
        Ok(())
    }

    fn full_reload(&self) -> Result<(), HostError> {
        for module in self.modules().iter().rev() {
            self.disable_module(module)?;
        }
        for (_, binding) in self.storage.tables().command_map.read().iter() {
            binding.mark_unregistered();
        }
        self.storage.tables().clear();

        let report = self.bootstrap();
        self.sync_commands()?;
        match report.failures.len() {
            0 => Ok(()),
            n => Err(HostError::Other(format!(
                "{} module(s) failed to load during full reload",
                n
            ))),
        }
    }

    fn is_module_enabled(&self, name: &str) -> bool {
        self.module(name).is_some_and(|m| m.is_enabled())
    }

    fn sync_commands(&self) -> Result<(), HostError> {
        self.command_syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn internal(&self, key: &str) -> Option<HostInternal> {
        match (&self.storage, key) {
            (HostStorage::Flat(manager), FLAT_MANAGER_KEY) => {
                Some(Arc::clone(manager) as HostInternal)
            }
            (HostStorage::Nested(manager), LAYERED_MANAGER_KEY) => {
                Some(Arc::clone(manager) as HostInternal)
            }
            _ => None,
        }
    }
}
