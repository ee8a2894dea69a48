//! Internal bookkeeping layouts.
//!
//! Both layouts hold the same five tables. They differ only in where the
//! tables hang: directly off one manager, or split between an instance
//! manager and a permission manager owned by a layered manager.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fastswap_kernel::{CommandBinding, ModuleRef, Permission, RegistryVariant};

/// Key under which a flat host exposes its [`SimpleModuleManager`].
pub const FLAT_MANAGER_KEY: &str = "module_manager";

/// Key under which a nested host exposes its [`LayeredModuleManager`].
pub const LAYERED_MANAGER_KEY: &str = "layered_module_manager";

/// Loaded modules in load order
pub type ModuleList = RwLock<Vec<ModuleRef>>;
/// Lowercase lookup name -> module
pub type LookupTable = RwLock<HashMap<String, ModuleRef>>;
/// Command label (plain or `prefix:label`) -> binding
pub type CommandMap = RwLock<HashMap<String, Arc<CommandBinding>>>;
/// Permission node -> permission
pub type PermissionTable = RwLock<HashMap<String, Permission>>;

/// The two default-permission buckets, keyed by "applies to operators".
#[derive(Debug, Default)]
pub struct DefaultPermissionSets {
    operator: HashSet<Permission>,
    non_operator: HashSet<Permission>,
}

impl DefaultPermissionSets {
    /// Bucket for operators (`true`) or everyone else (`false`)
    pub fn bucket(&self, operator: bool) -> &HashSet<Permission> {
        if operator {
            &self.operator
        } else {
            &self.non_operator
        }
    }

    /// Mutable bucket
    pub fn bucket_mut(&mut self, operator: bool) -> &mut HashSet<Permission> {
        if operator {
            &mut self.operator
        } else {
            &mut self.non_operator
        }
    }

    /// Drop every entry from both buckets
    pub fn clear(&mut self) {
        self.operator.clear();
        self.non_operator.clear();
    }
}

/// Default-permission buckets behind a lock
pub type DefaultPermissions = RwLock<DefaultPermissionSets>;

/// Borrowed view of the five tables, however they are laid out.
#[derive(Clone, Copy)]
pub struct Tables<'a> {
    pub modules: &'a ModuleList,
    pub lookup_names: &'a LookupTable,
    pub command_map: &'a CommandMap,
    pub permissions: &'a PermissionTable,
    pub default_perms: &'a DefaultPermissions,
}

impl Tables<'_> {
    /// Empty every table
    pub fn clear(&self) {
        self.modules.write().clear();
        self.lookup_names.write().clear();
        self.command_map.write().clear();
        self.permissions.write().clear();
        self.default_perms.write().clear();
    }
}

/// A storage layout a registry adapter can reach into.
pub trait StorageLayout: Send + Sync + 'static {
    /// Registry variant that operates on this layout
    const VARIANT: RegistryVariant;

    /// Borrow the tables
    fn tables(&self) -> Tables<'_>;
}

/// Flat layout: every table lives on the manager itself.
#[derive(Debug, Default)]
pub struct SimpleModuleManager {
    pub modules: ModuleList,
    pub lookup_names: LookupTable,
    pub command_map: CommandMap,
    pub permissions: PermissionTable,
    pub default_perms: DefaultPermissions,
}

impl StorageLayout for SimpleModuleManager {
    const VARIANT: RegistryVariant = RegistryVariant::Flat;

    fn tables(&self) -> Tables<'_> {
        Tables {
            modules: &self.modules,
            lookup_names: &self.lookup_names,
            command_map: &self.command_map,
            permissions: &self.permissions,
            default_perms: &self.default_perms,
        }
    }
}

/// Module instances, their lookup names and the command table.
#[derive(Debug, Default)]
pub struct InstanceManager {
    pub modules: ModuleList,
    pub lookup_names: LookupTable,
    pub command_map: CommandMap,
}

/// Permission table and default buckets.
#[derive(Debug, Default)]
pub struct PermissionManager {
    pub permissions: PermissionTable,
    pub default_perms: DefaultPermissions,
}

/// Nested layout: tables are split across two sub-managers.
#[derive(Debug, Default)]
pub struct LayeredModuleManager {
    pub instance_manager: Arc<InstanceManager>,
    pub permission_manager: Arc<PermissionManager>,
}

impl StorageLayout for LayeredModuleManager {
    const VARIANT: RegistryVariant = RegistryVariant::Nested;

    fn tables(&self) -> Tables<'_> {
        Tables {
            modules: &self.instance_manager.modules,
            lookup_names: &self.instance_manager.lookup_names,
            command_map: &self.instance_manager.command_map,
            permissions: &self.permission_manager.permissions,
            default_perms: &self.permission_manager.default_perms,
        }
    }
}
