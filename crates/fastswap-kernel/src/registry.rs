//! Registry capability over the host's internal bookkeeping.
//!
//! The host keeps five structures that a partial unload has to edit by hand:
//! the ordered module list, the case-insensitive lookup table, the command
//! table, the permission table and the two default-permission buckets. Hosts
//! lay these out differently; [`RegistryHandle`] hides the layout.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::HostError;
use crate::module::{Module, ModuleRef};

/// Default-access level of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PermissionDefault {
    /// Granted to everyone
    True,
    /// Granted to nobody
    False,
    /// Granted to operators only
    #[default]
    Op,
    /// Granted to everyone except operators
    NotOp,
}

impl PermissionDefault {
    /// Parse one of the names hosts accept in manifests.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            "op" | "isop" | "operator" | "isoperator" | "admin" | "isadmin" => Some(Self::Op),
            "!op" | "notop" | "not op" | "!operator" | "notoperator" | "not operator"
            | "!admin" | "notadmin" | "not admin" => Some(Self::NotOp),
            _ => None,
        }
    }

    /// Canonical manifest spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Op => "op",
            Self::NotOp => "not op",
        }
    }

    /// Whether the permission belongs in the bucket for `operator`.
    pub fn applies_to(&self, operator: bool) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Op => operator,
            Self::NotOp => !operator,
        }
    }
}

impl fmt::Display for PermissionDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PermissionDefault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PermissionDefault {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) => Ok(Self::True),
            Raw::Bool(false) => Ok(Self::False),
            Raw::Name(name) => Self::from_name(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown permission default `{}`", name))
            }),
        }
    }
}

/// A permission node as stored by the host.
///
/// Equality and hashing only consider the node name, matching how hosts key
/// the permission table.
#[derive(Debug, Clone)]
pub struct Permission {
    /// Node name (`module.action`)
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Default-access level
    pub default: PermissionDefault,
}

impl Permission {
    /// Create a permission with the given default
    pub fn new(name: impl Into<String>, default: PermissionDefault) -> Self {
        Self {
            name: name.into(),
            description: None,
            default,
        }
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Permission {}

impl Hash for Permission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A command-table entry.
///
/// The same binding is stored under its label, its aliases and their
/// `prefix:` qualified forms. Aliases live on the binding because modules may
/// add more at runtime than their manifest declares.
#[derive(Debug)]
pub struct CommandBinding {
    label: String,
    owner: String,
    description: Option<String>,
    permission: Option<String>,
    aliases: RwLock<Vec<String>>,
    registered: AtomicBool,
}

impl CommandBinding {
    /// Create a registered binding owned by `owner`
    pub fn new(label: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            owner: owner.into(),
            description: None,
            permission: None,
            aliases: RwLock::new(Vec::new()),
            registered: AtomicBool::new(true),
        }
    }

    /// Set aliases
    pub fn with_aliases<I, S>(self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.aliases.write() = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Set description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set required permission
    pub fn with_permission(mut self, permission: Option<String>) -> Self {
        self.permission = permission;
        self
    }

    /// Primary label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Declared name of the owning module
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Required permission
    pub fn permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    /// Snapshot of the live aliases
    pub fn aliases(&self) -> Vec<String> {
        self.aliases.read().clone()
    }

    /// Register an additional alias at runtime
    pub fn add_alias(&self, alias: impl Into<String>) {
        let alias = alias.into();
        let mut aliases = self.aliases.write();
        if !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }

    /// Whether the binding belongs to the named module
    pub fn is_owned_by(&self, module_name: &str) -> bool {
        self.owner == module_name
    }

    /// Whether the host still dispatches to this binding
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Stop dispatching to this binding
    pub fn mark_unregistered(&self) {
        self.registered.store(false, Ordering::Release);
    }
}

/// Which storage layout a [`RegistryHandle`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryVariant {
    /// All tables hang directly off one manager object
    Flat,
    /// Tables are split across an instance manager and a permission manager
    Nested,
    /// Storage could not be located; every operation is a no-op
    Unavailable,
}

impl fmt::Display for RegistryVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Nested => f.write_str("nested"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Mutation capability over the host's module bookkeeping.
///
/// Implementations borrow storage owned by the host under an
/// exclusive-writer, many-reader contract: every mutating call must happen on
/// the primary thread.
pub trait RegistryHandle: Send + Sync {
    /// Layout this handle operates on
    fn variant(&self) -> RegistryVariant;

    /// Whether storage was located
    fn is_available(&self) -> bool {
        self.variant() != RegistryVariant::Unavailable
    }

    /// Loaded modules in load order
    fn list_modules(&self) -> Vec<ModuleRef>;

    /// Remove one instance from the module list
    fn remove_module(&self, module: &Module) -> bool;

    /// Resolve a lookup name (case-insensitive)
    fn lookup(&self, name: &str) -> Option<ModuleRef>;

    /// Remove a lookup name (case-insensitive)
    fn remove_lookup_name(&self, name: &str) -> Option<ModuleRef>;

    /// Binding stored under `label`
    fn command_binding(&self, label: &str) -> Option<Arc<CommandBinding>>;

    /// Every `(label, binding)` entry in the command table
    fn command_entries(&self) -> Vec<(String, Arc<CommandBinding>)>;

    /// Store `binding` under `label`, returning what was there before
    fn install_command(
        &self,
        label: &str,
        binding: Arc<CommandBinding>,
    ) -> Option<Arc<CommandBinding>>;

    /// Remove the binding stored under `label`
    fn remove_command_binding(&self, label: &str) -> Option<Arc<CommandBinding>>;

    /// Permission registered under `name`
    fn permission(&self, name: &str) -> Option<Permission>;

    /// Remove a permission from the permission table
    fn remove_permission(&self, name: &str) -> Option<Permission>;

    /// Snapshot of one default-permission bucket
    fn default_bucket(&self, operator: bool) -> Vec<Permission>;

    /// Remove a permission from one default bucket; absent entries are a no-op
    fn remove_from_default_bucket(&self, operator: bool, permission: &Permission) -> bool;

    /// Let the host's dispatch tables observe the mutations
    fn resync(&self) -> Result<(), HostError>;

    /// Live module by exact declared name
    fn find_module(&self, name: &str) -> Option<ModuleRef> {
        self.list_modules().into_iter().find(|m| m.name() == name)
    }
}
