//! Contracts the host process provides.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use crate::error::HostError;
use crate::module::ModuleRef;

/// Permission node required to trigger reloads.
pub const RELOAD_PERMISSION: &str = "fastswap.use";

/// Permission node required to reload fastswap's own configuration.
pub const CONFIG_RELOAD_PERMISSION: &str = "fastswap.reloadconfig";

/// Type-erased host internals returned by [`ModuleHost::internal`].
pub type HostInternal = Arc<dyn Any + Send + Sync>;

/// Native lifecycle calls of the host.
///
/// All methods except [`ModuleHost::is_module_enabled`] and
/// [`ModuleHost::internal`] are only ever invoked on the primary thread.
pub trait ModuleHost: Send + Sync {
    /// Load a module from an archive. Registers it in the module list and
    /// lookup table but does not enable it.
    fn load_module(&self, archive: &Path) -> Result<ModuleRef, HostError>;

    /// Enable a loaded module.
    fn enable_module(&self, module: &ModuleRef) -> Result<(), HostError>;

    /// Disable a module. Does not remove it from any table.
    fn disable_module(&self, module: &ModuleRef) -> Result<(), HostError>;

    /// Restart-equivalent reload of every module. Blocks until done.
    fn full_reload(&self) -> Result<(), HostError>;

    /// Whether a module with this lookup name is loaded and enabled.
    fn is_module_enabled(&self, name: &str) -> bool;

    /// Push command-table changes to the host's dispatch layer.
    fn sync_commands(&self) -> Result<(), HostError> {
        Ok(())
    }

    /// Locate an internal object by key, used to probe storage layouts.
    fn internal(&self, key: &str) -> Option<HostInternal>;
}

/// Tone of a message sent back to a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Work has started
    Progress,
    /// Work completed
    Success,
    /// Work failed or was refused
    Failure,
}

/// Whoever asked for a reload: a console, a player, a remote admin.
pub trait Requester: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Whether the requester holds a permission node
    fn has_permission(&self, node: &str) -> bool;

    /// Deliver a user-visible message
    fn notify(&self, notice: Notice, message: &str);
}

/// Injected authorization predicate.
pub type Authorizer = Arc<dyn Fn(&dyn Requester) -> bool + Send + Sync>;

/// Default predicate: the requester must hold [`RELOAD_PERMISSION`].
pub fn permission_authorizer() -> Authorizer {
    Arc::new(|requester: &dyn Requester| requester.has_permission(RELOAD_PERMISSION))
}
