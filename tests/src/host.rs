use fastswap_kernel::{HostError, HostInternal, ModuleHost, ModuleRef};
use fastswap_runtime::EmbeddedHost;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Native calls seen by a [`CountingHost`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostCalls {
    pub load: usize,
    pub enable: usize,
    pub disable: usize,
    pub full_reload: usize,
    pub sync: usize,
}

impl HostCalls {
    /// Calls that change module state; syncs excluded
    pub fn lifecycle(&self) -> usize {
        self.load + self.enable + self.disable + self.full_reload
    }
}

#[derive(Default)]
struct Faults {
    enable: HashSet<String>,
    disable: HashSet<String>,
    full_reload: bool,
    sync: bool,
    hide_storage: bool,
}

/// Wraps an [`EmbeddedHost`], counting native calls and failing them on
/// request.
pub struct CountingHost {
    inner: Arc<EmbeddedHost>,
    calls: Mutex<HostCalls>,
    faults: Mutex<Faults>,
}

impl CountingHost {
    pub fn new(inner: Arc<EmbeddedHost>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(HostCalls::default()),
            faults: Mutex::new(Faults::default()),
        })
    }

    pub fn inner(&self) -> &Arc<EmbeddedHost> {
        &self.inner
    }

    pub fn calls(&self) -> HostCalls {
        self.calls.lock().clone()
    }

    pub fn reset_calls(&self) {
        *self.calls.lock() = HostCalls::default();
    }

    /// Fail `enable_module` for modules declaring `name`
    pub fn fail_enable(&self, name: &str) {
        self.faults.lock().enable.insert(name.to_string());
    }

    /// Fail `disable_module` for modules declaring `name`
    pub fn fail_disable(&self, name: &str) {
        self.faults.lock().disable.insert(name.to_string());
    }

    pub fn fail_full_reload(&self) {
        self.faults.lock().full_reload = true;
    }

    pub fn fail_sync(&self) {
        self.faults.lock().sync = true;
    }

    /// Answer `None` to every `internal` probe
    pub fn hide_storage(&self) {
        self.faults.lock().hide_storage = true;
    }
}

impl ModuleHost for CountingHost {
    fn load_module(&self, archive: &Path) -> Result<ModuleRef, HostError> {
        self.calls.lock().load += 1;
        self.inner.load_module(archive)
    }

    fn enable_module(&self, module: &ModuleRef) -> Result<(), HostError> {
        self.calls.lock().enable += 1;
        if self.faults.lock().enable.contains(module.name()) {
            return Err(HostError::Lifecycle {
                module: module.name().to_string(),
                phase: "enable",
                reason: "injected failure".to_string(),
            });
        }
        self.inner.enable_module(module)
    }

    fn disable_module(&self, module: &ModuleRef) -> Result<(), HostError> {
        self.calls.lock().disable += 1;
        if self.faults.lock().disable.contains(module.name()) {
            return Err(HostError::Lifecycle {
                module: module.name().to_string(),
                phase: "disable",
                reason: "injected failure".to_string(),
            });
        }
        self.inner.disable_module(module)
    }

    fn full_reload(&self) -> Result<(), HostError> {
        self.calls.lock().full_reload += 1;
        if self.faults.lock().full_reload {
            return Err(HostError::Other("injected failure".to_string()));
        }
        self.inner.full_reload()
    }

    fn is_module_enabled(&self, name: &str) -> bool {
        self.inner.is_module_enabled(name)
    }

    fn sync_commands(&self) -> Result<(), HostError> {
        self.calls.lock().sync += 1;
        if self.faults.lock().sync {
            return Err(HostError::Other("injected failure".to_string()));
        }
        self.inner.sync_commands()
    }

    fn internal(&self, key: &str) -> Option<HostInternal> {
        if self.faults.lock().hide_storage {
            return None;
        }
        self.inner.internal(key)
    }
}
