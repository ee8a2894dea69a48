//! Front ends
//!
//! Thin adapters that turn a command line, a chat message or a config reload
//! request into calls on [`ReloadOrchestrator`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use fastswap_kernel::config::{ConfigResult, FastSwapConfig};
use fastswap_kernel::{CONFIG_RELOAD_PERMISSION, Notice, ReloadPolicy, ReloadResult, Requester};

use crate::hot_reload::manager::DENIED_MESSAGE;
use crate::hot_reload::{PendingReload, ReloadOrchestrator};

/// Labels the reload command answers to, primary label first.
pub const TRIGGER_LABELS: [&str; 3] = ["reload", "rl", "r"];

/// Owner name the trigger commands are registered under.
pub const TRIGGER_OWNER: &str = "fastswap";

/// Label of the configuration reload command.
pub const CONFIG_RELOAD_LABEL: &str = "fastswapreload";

/// `/reload [module]`
#[derive(Clone)]
pub struct CommandTrigger {
    orchestrator: Arc<ReloadOrchestrator>,
}

impl CommandTrigger {
    pub fn new(orchestrator: Arc<ReloadOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Whether `label` (optionally `fastswap:`-qualified) names this command
    pub fn matches(label: &str) -> bool {
        let label = label.to_lowercase();
        let plain = label
            .strip_prefix(TRIGGER_OWNER)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(&label);
        TRIGGER_LABELS.contains(&plain)
    }

    /// Run the command. Arguments are joined with single spaces to form the
    /// target, so module names containing spaces work unquoted.
    pub fn on_command(
        &self,
        requester: Arc<dyn Requester>,
        args: &[&str],
    ) -> ReloadResult<PendingReload> {
        let target = args.join(" ");
        self.orchestrator.reload(requester, &target)
    }

    /// Completions for the argument being typed. Only the first argument
    /// completes, to every loaded module name.
    pub fn tab_complete(&self, args: &[&str]) -> Vec<String> {
        if args.len() != 1 {
            return Vec::new();
        }
        let prefix = args[0].to_lowercase();
        self.orchestrator
            .module_names()
            .into_iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect()
    }
}

/// Reload by typing `r`, `rl` or `reload` as a chat message.
#[derive(Clone)]
pub struct ChatTrigger {
    orchestrator: Arc<ReloadOrchestrator>,
}

impl ChatTrigger {
    pub fn new(orchestrator: Arc<ReloadOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Returns `true` when the message was consumed and must not be
    /// broadcast. Matching is exact and case-sensitive.
    pub fn on_chat(&self, requester: Arc<dyn Requester>, message: &str) -> bool {
        if !TRIGGER_LABELS.contains(&message) {
            return false;
        }
        if !self.orchestrator.policy().in_chat_reload {
            return false;
        }
        if !self.orchestrator.is_authorized(requester.as_ref()) {
            return false;
        }

        if let Err(e) = self.orchestrator.reload(requester, "") {
            warn!("Chat reload could not be scheduled: {}", e);
        }
        true
    }
}

/// `/fastswapreload`: re-read the configuration file and apply it.
#[derive(Clone)]
pub struct ConfigReloadCommand {
    orchestrator: Arc<ReloadOrchestrator>,
    path: PathBuf,
}

impl ConfigReloadCommand {
    pub fn new(orchestrator: Arc<ReloadOrchestrator>, path: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            path: path.into(),
        }
    }

    /// Configuration file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Returns the applied policy, or `None` when the requester lacks
    /// `fastswap.reloadconfig`. A broken file leaves the current policy in
    /// place.
    pub fn on_command(&self, requester: &dyn Requester) -> ConfigResult<Option<Arc<ReloadPolicy>>> {
        if !requester.has_permission(CONFIG_RELOAD_PERMISSION) {
            requester.notify(Notice::Failure, DENIED_MESSAGE);
            return Ok(None);
        }

        requester.notify(Notice::Progress, "Reloading fastswap's configuration.");
        let config = match FastSwapConfig::load(&self.path) {
            Ok(config) => config,
            Err(e) => {
                requester.notify(
                    Notice::Failure,
                    &format!("Could not reload configuration: {}", e),
                );
                return Err(e);
            }
        };

        self.orchestrator.apply_config(&config);
        info!(path = ?self.path, "Configuration reloaded by {}", requester.name());
        requester.notify(Notice::Success, "Successfully reloaded configuration");
        Ok(Some(self.orchestrator.policy()))
    }
}
