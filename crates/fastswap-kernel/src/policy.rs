//! Reload policy snapshots.
//!
//! A policy is built once per configuration load and then shared as an
//! `Arc<ReloadPolicy>`; it is replaced wholesale and never edited in place.

use std::collections::BTreeSet;
use std::time::Duration;

/// Length of one host tick.
pub const TICK: Duration = Duration::from_millis(50);

/// What a reload without a target does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadMode {
    /// Restart-equivalent reload of the whole host
    Full,
    /// Reload modules only, leaving other host state alone
    #[default]
    ModulesOnly,
}

/// How the filter list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Only listed modules are reloaded
    Whitelist,
    /// Every module except the listed ones is reloaded
    #[default]
    Blacklist,
}

impl FilterMode {
    /// `whitelist` (any case) selects [`FilterMode::Whitelist`]; anything else is a blacklist.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("whitelist") {
            Self::Whitelist
        } else {
            Self::Blacklist
        }
    }

    /// Whether whitelist semantics apply
    pub fn is_whitelist(&self) -> bool {
        matches!(self, Self::Whitelist)
    }
}

/// Immutable reload policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPolicy {
    /// Full or modules-only reloads
    pub mode: ReloadMode,
    /// Normalized (trimmed, lowercased) module names
    pub filter_list: BTreeSet<String>,
    /// Filter interpretation
    pub filter_mode: FilterMode,
    /// Whether the watcher runs
    pub auto_reload: bool,
    /// Watcher period in ticks
    pub poll_interval_ticks: u32,
    /// Whether short chat phrases trigger reloads
    pub in_chat_reload: bool,
}

impl Default for ReloadPolicy {
    fn default() -> Self {
        Self {
            mode: ReloadMode::ModulesOnly,
            filter_list: BTreeSet::new(),
            filter_mode: FilterMode::Blacklist,
            auto_reload: true,
            poll_interval_ticks: 20,
            in_chat_reload: true,
        }
    }
}

impl ReloadPolicy {
    /// Create the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Set reload mode
    pub fn with_mode(mut self, mode: ReloadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set filter mode
    pub fn with_filter_mode(mut self, filter_mode: FilterMode) -> Self {
        self.filter_mode = filter_mode;
        self
    }

    /// Replace the filter list; names are normalized
    pub fn with_filter_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_list = names
            .into_iter()
            .map(|n| normalize_filter_name(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        self
    }

    /// Enable/disable the watcher
    pub fn with_auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    /// Set watcher period in ticks
    pub fn with_poll_interval_ticks(mut self, ticks: u32) -> Self {
        self.poll_interval_ticks = ticks;
        self
    }

    /// Enable/disable chat triggers
    pub fn with_in_chat_reload(mut self, enabled: bool) -> Self {
        self.in_chat_reload = enabled;
        self
    }

    /// Whether a batch reload processes the named module.
    ///
    /// Whitelist mode selects listed modules, blacklist mode selects the rest.
    pub fn selects(&self, module_name: &str) -> bool {
        let listed = self.filter_list.contains(&normalize_filter_name(module_name));
        self.filter_mode.is_whitelist() == listed
    }

    /// Watcher period; zero ticks is treated as one.
    pub fn poll_interval(&self) -> Duration {
        TICK * self.poll_interval_ticks.max(1)
    }
}

/// Trim then lowercase, applied to both sides of every filter comparison.
pub fn normalize_filter_name(name: &str) -> String {
    name.trim().to_lowercase()
}
