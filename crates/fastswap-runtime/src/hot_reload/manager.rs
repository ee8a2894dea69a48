//! Reload orchestrator
//!
//! Owns the reload policy and the single entry point front ends call.
//! Sequences disable -> unregister -> load -> enable per module on the
//! primary thread, or delegates to the host's full reload.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use fastswap_kernel::config::FastSwapConfig;
use fastswap_kernel::{
    Authorizer, CommandBinding, ModuleHost, ModuleRef, Notice, PrimaryScheduler, RELOAD_PERMISSION,
    RegistryHandle, ReloadError, ReloadMode, ReloadPolicy, ReloadResult, Requester,
    SchedulerError, permission_authorizer,
};

use super::loader::DescriptorLoader;
use super::registry::locate_registry;
use super::unregister::unregister;
use super::watcher::{AutoReloadWatcher, WatchEvent, WatchEventKind, WatchSink, WatcherHandle};
use crate::trigger::{TRIGGER_LABELS, TRIGGER_OWNER};

/// Message sent to requesters that fail the authorization check.
pub const DENIED_MESSAGE: &str = "You do not have permission to run this command.";

/// What a reload request covered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadKind {
    /// Host-wide restart-equivalent reload
    Full,
    /// Every module selected by the filter
    Modules,
    /// One named module
    Module(String),
}

impl fmt::Display for ReloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadKind::Full => f.write_str("full"),
            ReloadKind::Modules => f.write_str("modules"),
            ReloadKind::Module(name) => write!(f, "module \"{}\"", name),
        }
    }
}

/// A module a batch reload could not bring back
#[derive(Debug)]
pub struct ModuleFailure {
    /// Declared module name
    pub module: String,
    /// Why it failed
    pub error: ReloadError,
}

/// Result of a completed reload request
#[derive(Debug)]
pub struct ReloadOutcome {
    /// What was reloaded
    pub kind: ReloadKind,
    /// Modules reloaded successfully, in processing order
    pub reloaded: Vec<String>,
    /// Per-module failures (batch reloads only)
    pub failures: Vec<ModuleFailure>,
    /// Wall time spent on the primary thread
    pub elapsed: Duration,
}

impl ReloadOutcome {
    /// Whether every selected module came back
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Elapsed time in whole milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Reload lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// A request passed authorization and was handed to the primary thread
    Requested { requester: String, target: String },
    /// A module was disabled, unregistered, loaded and enabled again
    ModuleReloaded { module: String, duration: Duration },
    /// A module was loaded for the first time by the watcher
    ModuleLoaded { module: String, duration: Duration },
    /// A module could not be reloaded or loaded
    ModuleFailed {
        module: String,
        error: String,
        duration: Duration,
    },
    /// A request finished
    Completed {
        kind: ReloadKind,
        success: bool,
        duration: Duration,
    },
}

/// Handle to a request queued on the primary thread
#[derive(Debug)]
pub struct PendingReload {
    rx: oneshot::Receiver<ReloadResult<ReloadOutcome>>,
}

impl PendingReload {
    /// Wait for the request to finish
    pub async fn outcome(self) -> ReloadResult<ReloadOutcome> {
        self.rx.await.map_err(|_| SchedulerError::Dropped)?
    }

    /// Blocking variant of [`PendingReload::outcome`]; must not be called
    /// from inside an async runtime or from the primary thread.
    pub fn blocking_outcome(self) -> ReloadResult<ReloadOutcome> {
        self.rx.blocking_recv().map_err(|_| SchedulerError::Dropped)?
    }

    /// The result, if the request has already finished
    pub fn try_outcome(&mut self) -> Option<ReloadResult<ReloadOutcome>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SchedulerError::Dropped.into())),
        }
    }
}

/// Builder for [`ReloadOrchestrator`]
pub struct ReloadOrchestratorBuilder {
    host: Arc<dyn ModuleHost>,
    scheduler: Arc<dyn PrimaryScheduler>,
    loader: DescriptorLoader,
    authorizer: Authorizer,
    policy: ReloadPolicy,
    runtime: Option<Handle>,
}

impl ReloadOrchestratorBuilder {
    /// Set the authorization predicate (default: holds `fastswap.use`)
    pub fn with_authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Set the initial policy
    pub fn with_policy(mut self, policy: ReloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the runtime the watcher is spawned on
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set archive extension
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.loader = self.loader.with_extension(extension);
        self
    }

    /// Probe the host's registry and build the orchestrator.
    ///
    /// Does not start the watcher; call [`ReloadOrchestrator::start`].
    pub fn build(self) -> Arc<ReloadOrchestrator> {
        let registry = locate_registry(Arc::clone(&self.host));
        if registry.is_available() {
            info!(variant = %registry.variant(), "Registry storage located");
        } else {
            error!(
                "Could not locate host registry storage; single-module and modules-only \
                 reloads are unsupported on this host"
            );
        }

        let (events, _) = broadcast::channel(256);
        Arc::new(ReloadOrchestrator {
            host: self.host,
            registry,
            loader: self.loader,
            scheduler: self.scheduler,
            authorizer: self.authorizer,
            policy: RwLock::new(Arc::new(self.policy)),
            runtime: self.runtime.or_else(|| Handle::try_current().ok()),
            watcher: Mutex::new(None),
            triggers_installed: AtomicBool::new(false),
            events,
        })
    }
}

/// Reload orchestrator
pub struct ReloadOrchestrator {
    host: Arc<dyn ModuleHost>,
    registry: Arc<dyn RegistryHandle>,
    loader: DescriptorLoader,
    scheduler: Arc<dyn PrimaryScheduler>,
    authorizer: Authorizer,
    /// Swapped wholesale, never edited in place
    policy: RwLock<Arc<ReloadPolicy>>,
    runtime: Option<Handle>,
    watcher: Mutex<Option<WatcherHandle>>,
    /// Re-install trigger commands after a full reload wipes the table
    triggers_installed: AtomicBool,
    events: broadcast::Sender<ReloadEvent>,
}

impl ReloadOrchestrator {
    /// Start building an orchestrator for `host`, scanning `modules_dir`
    pub fn builder(
        host: Arc<dyn ModuleHost>,
        scheduler: Arc<dyn PrimaryScheduler>,
        modules_dir: impl Into<PathBuf>,
    ) -> ReloadOrchestratorBuilder {
        ReloadOrchestratorBuilder {
            host,
            scheduler,
            loader: DescriptorLoader::new(modules_dir),
            authorizer: permission_authorizer(),
            policy: ReloadPolicy::default(),
            runtime: None,
        }
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<ReloadPolicy> {
        Arc::clone(&self.policy.read())
    }

    /// Registry handle in use
    pub fn registry(&self) -> &Arc<dyn RegistryHandle> {
        &self.registry
    }

    /// Descriptor loader in use
    pub fn loader(&self) -> &DescriptorLoader {
        &self.loader
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    /// Whether `requester` passes the authorization predicate
    pub fn is_authorized(&self, requester: &dyn Requester) -> bool {
        (self.authorizer)(requester)
    }

    /// Declared names of loaded modules, in load order
    pub fn module_names(&self) -> Vec<String> {
        self.registry
            .list_modules()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Entry point for every front end.
    ///
    /// `target` is a declared module name, or empty. Unauthorized requests
    /// are refused here with no side effects; everything else runs on the
    /// primary thread (inline if the caller is already on it).
    pub fn reload(
        self: &Arc<Self>,
        requester: Arc<dyn Requester>,
        target: &str,
    ) -> ReloadResult<PendingReload> {
        if !self.is_authorized(requester.as_ref()) {
            warn!(requester = %requester.name(), "Reload request denied");
            requester.notify(Notice::Failure, DENIED_MESSAGE);
            return Err(ReloadError::AuthorizationDenied {
                requester: requester.name().to_string(),
            });
        }

        self.emit(ReloadEvent::Requested {
            requester: requester.name().to_string(),
            target: target.to_string(),
        });

        let (tx, rx) = oneshot::channel();
        let this = Arc::clone(self);
        let target = target.to_string();
        self.scheduler.run_or_schedule(Box::new(move || {
            let result = this.execute(requester.as_ref(), &target);
            let _ = tx.send(result);
        }))?;

        Ok(PendingReload { rx })
    }

    fn execute(&self, requester: &dyn Requester, target: &str) -> ReloadResult<ReloadOutcome> {
        let policy = self.policy();
        let started = Instant::now();

        let result = if !target.is_empty() {
            self.run_single(requester, target, started)
        } else {
            match policy.mode {
                ReloadMode::Full => self.run_full(requester, started),
                ReloadMode::ModulesOnly => self.run_batch(requester, &policy, started),
            }
        };

        match &result {
            Ok(outcome) => self.emit(ReloadEvent::Completed {
                kind: outcome.kind.clone(),
                success: outcome.is_success(),
                duration: outcome.elapsed,
            }),
            Err(e) => {
                let kind = if target.is_empty() {
                    match policy.mode {
                        ReloadMode::Full => ReloadKind::Full,
                        ReloadMode::ModulesOnly => ReloadKind::Modules,
                    }
                } else {
                    ReloadKind::Module(target.to_string())
                };
                debug!(kind = %kind, "Reload failed: {}", e);
                self.emit(ReloadEvent::Completed {
                    kind,
                    success: false,
                    duration: started.elapsed(),
                });
            }
        }
        result
    }

    fn run_full(&self, requester: &dyn Requester, started: Instant) -> ReloadResult<ReloadOutcome> {
        requester.notify(Notice::Progress, "The host is reloading...");
        info!("{} reloaded the host", requester.name());

        if let Err(e) = self.host.full_reload() {
            let err = ReloadError::host("full reload", "*", e);
            let elapsed_ms = started.elapsed().as_millis();
            error!(elapsed_ms = elapsed_ms as u64, "{}", err);
            requester.notify(Notice::Failure, &format!("{} after {}ms.", err, elapsed_ms));
            return Err(err);
        }
        if self.triggers_installed.load(Ordering::Acquire) {
            self.install_trigger_commands();
        }

        let elapsed = started.elapsed();
        requester.notify(
            Notice::Success,
            &format!("The host has successfully reloaded in {}ms.", elapsed.as_millis()),
        );
        info!(elapsed_ms = elapsed.as_millis() as u64, "Full reload complete");
        Ok(ReloadOutcome {
            kind: ReloadKind::Full,
            reloaded: Vec::new(),
            failures: Vec::new(),
            elapsed,
        })
    }

    fn run_batch(
        &self,
        requester: &dyn Requester,
        policy: &ReloadPolicy,
        started: Instant,
    ) -> ReloadResult<ReloadOutcome> {
        self.ensure_registry(requester)?;
        requester.notify(Notice::Progress, "The host is reloading all modules...");
        info!("{} reloaded the host's modules", requester.name());

        let mut reloaded = Vec::new();
        let mut failures = Vec::new();

        // Snapshot: reloaded instances are appended to the live list.
        for module in self.registry.list_modules() {
            if !policy.selects(module.name()) {
                debug!(module = %module.name(), "Skipped by filter");
                continue;
            }
            let name = module.name().to_string();
            match self.reload_module(&module) {
                Ok(_) => reloaded.push(name),
                Err(error) => {
                    requester.notify(
                        Notice::Failure,
                        &format!(
                            "Could not reload module \"{}\" after {}ms: {}",
                            name,
                            started.elapsed().as_millis(),
                            error
                        ),
                    );
                    failures.push(ModuleFailure {
                        module: name,
                        error,
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        if failures.is_empty() {
            requester.notify(
                Notice::Success,
                &format!(
                    "The host has successfully reloaded all modules in {}ms.",
                    elapsed.as_millis()
                ),
            );
        } else {
            requester.notify(
                Notice::Failure,
                &format!(
                    "Reloaded {} of {} modules in {}ms.",
                    reloaded.len(),
                    reloaded.len() + failures.len(),
                    elapsed.as_millis()
                ),
            );
        }
        info!(
            reloaded = reloaded.len(),
            failed = failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Module reload complete"
        );

        Ok(ReloadOutcome {
            kind: ReloadKind::Modules,
            reloaded,
            failures,
            elapsed,
        })
    }

    fn run_single(
        &self,
        requester: &dyn Requester,
        target: &str,
        started: Instant,
    ) -> ReloadResult<ReloadOutcome> {
        self.ensure_registry(requester)?;
        requester.notify(
            Notice::Progress,
            &format!("The host is reloading module \"{}\"...", target),
        );
        info!("{} reloaded module \"{}\"", requester.name(), target);

        let Some(module) = self.registry.find_module(target) else {
            let err = ReloadError::ModuleNotFound(target.to_string());
            let elapsed_ms = started.elapsed().as_millis();
            warn!(elapsed_ms = elapsed_ms as u64, "{}", err);
            requester.notify(Notice::Failure, &format!("{}. Took {}ms.", err, elapsed_ms));
            return Err(err);
        };

        if let Err(err) = self.reload_module(&module) {
            requester.notify(
                Notice::Failure,
                &format!(
                    "Could not reload module \"{}\" after {}ms: {}",
                    target,
                    started.elapsed().as_millis(),
                    err
                ),
            );
            return Err(err);
        }

        let elapsed = started.elapsed();
        requester.notify(
            Notice::Success,
            &format!(
                "The host has successfully reloaded module \"{}\" in {} ms.",
                target,
                elapsed.as_millis()
            ),
        );
        Ok(ReloadOutcome {
            kind: ReloadKind::Module(target.to_string()),
            reloaded: vec![target.to_string()],
            failures: Vec::new(),
            elapsed,
        })
    }

    fn ensure_registry(&self, requester: &dyn Requester) -> ReloadResult<()> {
        if self.registry.is_available() {
            return Ok(());
        }
        let err = ReloadError::RegistryUnavailable;
        requester.notify(Notice::Failure, &err.to_string());
        Err(err)
    }

    /// Disable, unregister, load and enable one module. Primary thread only.
    fn reload_module(&self, module: &ModuleRef) -> ReloadResult<ModuleRef> {
        let name = module.name().to_string();
        let started = Instant::now();

        let result = self
            .host
            .disable_module(module)
            .map_err(|e| ReloadError::host("disable", &name, e))
            .and_then(|()| {
                unregister(module, self.registry.as_ref());
                self.load_and_enable(&name, Some(module.archive()))
            });

        match &result {
            Ok(_) => {
                let duration = started.elapsed();
                info!(module = %name, elapsed_ms = duration.as_millis() as u64, "Reloaded module");
                self.emit(ReloadEvent::ModuleReloaded {
                    module: name,
                    duration,
                });
            }
            Err(e) => {
                let duration = started.elapsed();
                warn!(
                    module = %name,
                    elapsed_ms = duration.as_millis() as u64,
                    "Reload failed: {}", e
                );
                self.emit(ReloadEvent::ModuleFailed {
                    module: name,
                    error: e.to_string(),
                    duration,
                });
            }
        }
        result
    }

    /// Find the archive declaring `name`, load it and enable it.
    ///
    /// `previous` is the archive the module was last loaded from; when no
    /// archive declares the name any more, a broken manifest there is
    /// reported instead of a generic miss. If enabling fails the new
    /// instance is unregistered again.
    fn load_and_enable(&self, name: &str, previous: Option<&Path>) -> ReloadResult<ModuleRef> {
        let archive = self.locate_archive(name, previous)?;
        let module = self
            .loader
            .load_archive(self.host.as_ref(), &archive)
            .map_err(|e| e.into_reload_error(name))?;

        if let Err(e) = self.host.enable_module(&module) {
            let _ = self.host.disable_module(&module);
            unregister(&module, self.registry.as_ref());
            return Err(ReloadError::host("enable", name, e));
        }
        // The module is live at this point; a failed sync only leaves client
        // command trees stale until the next one.
        if let Err(e) = self.registry.resync() {
            warn!(module = %name, "Command sync failed after enabling: {}", e);
        }
        Ok(module)
    }

    fn locate_archive(&self, name: &str, previous: Option<&Path>) -> ReloadResult<PathBuf> {
        if let Some(path) = self.loader.find_archive(name) {
            return Ok(path);
        }
        if let Some(previous) = previous.filter(|p| p.exists()) {
            if let Err(e) = self.loader.parse_manifest(previous) {
                return Err(e.into_reload_error(name));
            }
        }
        Err(ReloadError::load(
            name,
            format!("no archive in {:?} declares it", self.loader.directory()),
        ))
    }

    /// Handle a watcher decision. Primary thread only.
    ///
    /// Watcher work originates in the host process, so it skips the
    /// authorization check and the filter list.
    pub fn handle_watch_event(&self, event: WatchEvent) {
        match event.kind {
            WatchEventKind::Discovered => self.auto_load(&event.module),
            WatchEventKind::Modified => self.auto_reload(&event.module),
        }
    }

    fn auto_load(&self, name: &str) {
        info!("Found new module \"{}\", loading...", name);
        let started = Instant::now();

        match self.load_and_enable(name, None) {
            Ok(_) => {
                let duration = started.elapsed();
                info!(
                    "The host has successfully loaded module \"{}\" in {} ms.",
                    name,
                    duration.as_millis()
                );
                self.emit(ReloadEvent::ModuleLoaded {
                    module: name.to_string(),
                    duration,
                });
            }
            Err(e) => {
                let duration = started.elapsed();
                warn!(
                    elapsed_ms = duration.as_millis() as u64,
                    "Could not load module \"{}\": {}", name, e
                );
                self.emit(ReloadEvent::ModuleFailed {
                    module: name.to_string(),
                    error: e.to_string(),
                    duration,
                });
            }
        }
    }

    fn auto_reload(&self, name: &str) {
        info!("Detected module \"{}\" has been updated, reloading...", name);
        if !self.registry.is_available() {
            warn!(module = %name, "{}", ReloadError::RegistryUnavailable);
            return;
        }
        let started = Instant::now();

        let Some(module) = self.registry.find_module(name) else {
            // No longer loaded, treat like a new archive.
            self.auto_load(name);
            return;
        };
        if self.reload_module(&module).is_ok() {
            info!(
                "The host has successfully reloaded module \"{}\" in {} ms.",
                name,
                started.elapsed().as_millis()
            );
        }
    }

    /// Replace the policy snapshot and bring the watcher in line with it.
    ///
    /// The watcher is restarted only when its enabled flag or period changed
    /// (or it is not running while enabled), and stopped when disabled.
    pub fn apply_policy(self: &Arc<Self>, policy: ReloadPolicy) {
        let mut watcher = self.watcher.lock();
        let next = Arc::new(policy);
        let previous = std::mem::replace(&mut *self.policy.write(), Arc::clone(&next));

        if !next.auto_reload {
            if let Some(handle) = watcher.take() {
                handle.cancel();
                info!("Auto-reload watcher stopped");
            }
            return;
        }

        let running = watcher.as_ref().is_some_and(|h| !h.is_finished());
        let changed = previous.auto_reload != next.auto_reload
            || previous.poll_interval() != next.poll_interval();
        if changed || !running {
            self.start_watcher_locked(&mut watcher);
        }
    }

    /// [`ReloadOrchestrator::apply_policy`] from a loaded configuration
    pub fn apply_config(self: &Arc<Self>, config: &FastSwapConfig) {
        self.apply_policy(config.to_policy());
    }

    /// Start background work the policy asks for
    pub fn start(self: &Arc<Self>) {
        if self.policy().auto_reload {
            self.start_watcher();
        }
    }

    /// Cancel background work
    pub fn shutdown(&self) {
        self.stop_watcher();
        info!("Reload orchestrator shut down");
    }

    /// (Re)start the watcher, cancelling any running one first.
    ///
    /// Returns `false` when no async runtime is available.
    pub fn start_watcher(self: &Arc<Self>) -> bool {
        let mut watcher = self.watcher.lock();
        self.start_watcher_locked(&mut watcher)
    }

    /// Cancel the watcher if one is running
    pub fn stop_watcher(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.cancel();
        }
    }

    /// Whether a watcher is currently scheduled
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_cancelled() && !h.is_finished())
    }

    /// Period of the running watcher
    pub fn watch_period(&self) -> Option<Duration> {
        self.watcher.lock().as_ref().map(WatcherHandle::period)
    }

    fn start_watcher_locked(self: &Arc<Self>, slot: &mut Option<WatcherHandle>) -> bool {
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        let Some(runtime) = &self.runtime else {
            warn!("No async runtime available, auto-reload watcher not started");
            return false;
        };

        let watcher = AutoReloadWatcher::new(
            self.loader.clone(),
            Arc::clone(&self.host),
            self.watch_sink(),
        );
        *slot = Some(watcher.spawn(runtime, self.policy().poll_interval()));
        true
    }

    /// Sink that hands watcher events to the primary thread.
    ///
    /// Holds the orchestrator weakly so a running watcher does not keep it
    /// alive.
    pub fn watch_sink(self: &Arc<Self>) -> WatchSink {
        let weak: Weak<Self> = Arc::downgrade(self);
        let scheduler = Arc::clone(&self.scheduler);
        Arc::new(move |event: WatchEvent| {
            let weak = weak.clone();
            scheduler.run_or_schedule(Box::new(move || {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.handle_watch_event(event);
                }
            }))
        })
    }

    /// Bind `reload`, `rl`, `r` and their qualified forms to the reload
    /// trigger, replacing whatever the host had under those labels.
    ///
    /// Returns the number of labels bound.
    pub fn install_trigger_commands(&self) -> usize {
        if !self.registry.is_available() {
            warn!("{}", ReloadError::RegistryUnavailable);
            return 0;
        }

        let binding = Arc::new(
            CommandBinding::new(TRIGGER_LABELS[0], TRIGGER_OWNER)
                .with_aliases(TRIGGER_LABELS[1..].iter().copied())
                .with_description(Some("Reload modules in place".to_string()))
                .with_permission(Some(RELOAD_PERMISSION.to_string())),
        );

        let mut installed = 0;
        for label in TRIGGER_LABELS {
            for key in [label.to_string(), format!("{}:{}", TRIGGER_OWNER, label)] {
                if let Some(previous) = self.registry.install_command(&key, Arc::clone(&binding)) {
                    debug!(label = %key, owner = %previous.owner(), "Replaced existing command");
                }
                installed += 1;
            }
        }

        if let Err(e) = self.registry.resync() {
            warn!("Command sync after installing triggers failed: {}", e);
        }
        self.triggers_installed.store(true, Ordering::Release);
        installed
    }

    fn emit(&self, event: ReloadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for ReloadOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.cancel();
        }
    }
}
