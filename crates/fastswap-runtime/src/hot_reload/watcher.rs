//! Auto-reload watcher
//!
//! Polls the module directory on a fixed period and compares each archive's
//! modification time against what it saw last. Decisions are handed to a
//! sink; the watcher itself never touches the registry.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fastswap_kernel::{ModuleHost, SchedulerError};

use super::loader::DescriptorLoader;

/// Watch event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// An archive seen for the first time whose module is not enabled
    Discovered,
    /// A known archive whose modification time changed
    Modified,
}

/// Watch event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Event kind
    pub kind: WatchEventKind,
    /// Declared module name from the archive's manifest
    pub module: String,
    /// Archive path
    pub path: PathBuf,
}

/// Receives watcher decisions. Returning an error means the event was not
/// enqueued and will be retried on the next poll.
pub type WatchSink = Arc<dyn Fn(WatchEvent) -> Result<(), SchedulerError> + Send + Sync>;

/// Last observed modification time (ms since the epoch) per archive.
#[derive(Debug, Default, Clone)]
pub struct WatchState {
    last_modified: HashMap<PathBuf, u64>,
}

impl WatchState {
    /// Recorded timestamp for `path`
    pub fn get(&self, path: &Path) -> Option<u64> {
        self.last_modified.get(path).copied()
    }

    /// Number of tracked archives
    pub fn len(&self) -> usize {
        self.last_modified.len()
    }

    /// Whether nothing is tracked yet
    pub fn is_empty(&self) -> bool {
        self.last_modified.is_empty()
    }

    fn record(&mut self, path: PathBuf, modified: u64) {
        self.last_modified.insert(path, modified);
    }

    /// Forget archives that are no longer listed
    fn retain_listed(&mut self, listed: &[PathBuf]) {
        let listed: HashSet<&PathBuf> = listed.iter().collect();
        self.last_modified.retain(|path, _| listed.contains(path));
    }
}

/// Periodic archive poller.
pub struct AutoReloadWatcher {
    loader: DescriptorLoader,
    host: Arc<dyn ModuleHost>,
    sink: WatchSink,
    state: WatchState,
}

impl AutoReloadWatcher {
    /// Create a watcher with empty [`WatchState`]
    pub fn new(loader: DescriptorLoader, host: Arc<dyn ModuleHost>, sink: WatchSink) -> Self {
        Self {
            loader,
            host,
            sink,
            state: WatchState::default(),
        }
    }

    /// Current watch state
    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Run one poll. Returns how many events were enqueued.
    pub fn poll_once(&mut self) -> usize {
        let archives = match self.loader.list_archives() {
            Ok(archives) => archives,
            Err(e) => {
                debug!("Watcher could not list {:?}: {}", self.loader.directory(), e);
                return 0;
            }
        };

        self.state.retain_listed(&archives);

        let mut enqueued = 0;
        for path in archives {
            // Half-written archives fail here and are picked up next poll.
            let Ok(manifest) = self.loader.parse_manifest(&path) else {
                continue;
            };
            let Some(modified) = modified_millis(&path) else {
                continue;
            };

            match self.state.get(&path) {
                None => {
                    self.state.record(path.clone(), modified);
                    if self.host.is_module_enabled(&manifest.name) {
                        continue;
                    }
                    let event = WatchEvent {
                        kind: WatchEventKind::Discovered,
                        module: manifest.name,
                        path,
                    };
                    if self.emit(event) {
                        enqueued += 1;
                    }
                }
                Some(previous) if previous != modified => {
                    let event = WatchEvent {
                        kind: WatchEventKind::Modified,
                        module: manifest.name,
                        path: path.clone(),
                    };
                    if self.emit(event) {
                        self.state.record(path, modified);
                        enqueued += 1;
                    }
                }
                Some(_) => {}
            }
        }
        enqueued
    }

    fn emit(&self, event: WatchEvent) -> bool {
        debug!(module = %event.module, kind = ?event.kind, "Watcher enqueueing");
        match (self.sink)(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Watcher could not enqueue work: {}", e);
                false
            }
        }
    }

    /// Poll every `period` on `runtime` until the returned handle is cancelled.
    ///
    /// The first poll runs immediately. It records every archive on disk and
    /// reports `Discovered` for those whose module is not enabled.
    pub fn spawn(mut self, runtime: &Handle, period: Duration) -> WatcherHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Watcher cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        self.poll_once();
                    }
                }
            }
        });

        info!(period_ms = period.as_millis() as u64, "Auto-reload watcher started");
        WatcherHandle {
            cancel,
            task: Some(task),
            period,
        }
    }
}

/// Cancellation handle for a spawned watcher. Dropping it cancels the watcher.
pub struct WatcherHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    period: Duration,
}

impl WatcherHandle {
    /// Poll period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the polling task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Cancel and wait for the polling task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn modified_millis(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as u64)
}
