//! Typed errors for the reload sub-system.
//!
//! Nothing here is fatal to the host: every variant describes why a single
//! reload attempt (or a single module inside a batch) did not go through.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or validating a module manifest.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// The manifest is not valid YAML or does not match the expected shape.
    #[error("Invalid manifest syntax: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// A required attribute is missing or empty.
    #[error("Manifest is missing required attribute `{0}`")]
    MissingAttribute(&'static str),

    /// The declared module name contains characters the host refuses.
    #[error("Invalid module name `{0}`: only [A-Za-z0-9 _.-] are allowed")]
    InvalidName(String),

    /// A permission declares a default-access level the host does not know.
    #[error("Invalid default `{value}` for permission `{permission}`")]
    InvalidPermissionDefault {
        /// The permission being declared.
        permission: String,
        /// The unrecognised value.
        value: String,
    },
}

/// Errors raised by the host's native lifecycle calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostError {
    /// The archive could not be read or its manifest is invalid.
    #[error("Invalid module archive {path:?}: {reason}")]
    InvalidArchive {
        /// Archive path.
        path: PathBuf,
        /// Human readable reason.
        reason: String,
    },

    /// The manifest names an entry point the host cannot resolve.
    #[error("Module `{module}` has no usable entry point")]
    MissingEntryPoint {
        /// Declared module name.
        module: String,
    },

    /// The module targets an API version newer than the host supports.
    #[error("Module `{module}` requires API version {required}, host provides {provided}")]
    IncompatibleVersion {
        /// Declared module name.
        module: String,
        /// Version the module asks for.
        required: u32,
        /// Version the host implements.
        provided: u32,
    },

    /// A module with the same name (or provided alias) is already registered.
    #[error("A module named `{0}` is already loaded")]
    DuplicateName(String),

    /// A hard dependency is not loaded.
    #[error("Module `{module}` depends on `{dependency}` which is not loaded")]
    UnknownDependency {
        /// Declared module name.
        module: String,
        /// Missing dependency.
        dependency: String,
    },

    /// The module's own enable/disable hook failed.
    #[error("Module `{module}` failed during {phase}: {reason}")]
    Lifecycle {
        /// Declared module name.
        module: String,
        /// Lifecycle phase (`enable`, `disable`).
        phase: &'static str,
        /// Human readable reason.
        reason: String,
    },

    /// Catch-all for host failures that don't fit the above categories.
    #[error("{0}")]
    Other(String),
}

/// Errors raised when handing work to the primary thread.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedulerError {
    /// The primary thread has shut down and no longer accepts tasks.
    #[error("Primary thread is not accepting tasks")]
    Closed,

    /// The task was accepted but dropped before it produced a result.
    #[error("Primary thread dropped the task before completion")]
    Dropped,
}

/// Errors reported for a reload request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReloadError {
    /// The requester is not allowed to trigger reloads.
    #[error("{requester} is not allowed to reload modules")]
    AuthorizationDenied {
        /// Requester display name.
        requester: String,
    },

    /// No live module has the requested declared name.
    #[error("The module \"{0}\" is not a valid module")]
    ModuleNotFound(String),

    /// The target module's manifest could not be parsed.
    #[error("Could not parse manifest of {path:?}: {source}")]
    ManifestParse {
        /// Archive path.
        path: PathBuf,
        /// Parse failure.
        #[source]
        source: ManifestError,
    },

    /// The module could not be loaded again; it is left unregistered.
    #[error("Could not load module \"{module}\": {reason}")]
    LoadFailure {
        /// Declared module name.
        module: String,
        /// Human readable reason.
        reason: String,
    },

    /// Host storage could not be located at startup; scoped reloads are unsupported.
    #[error("Host registry storage is unavailable; scoped reloads are unsupported")]
    RegistryUnavailable,

    /// A host-native enable/disable/reload call failed.
    #[error("Host {operation} failed for \"{module}\": {source}")]
    HostNativeCall {
        /// Operation name (`disable`, `enable`, `full reload`).
        operation: &'static str,
        /// Declared module name, or `*` for host-wide calls.
        module: String,
        /// Underlying host failure.
        #[source]
        source: HostError,
    },

    /// The primary thread could not run the request.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl ReloadError {
    /// Build a [`ReloadError::HostNativeCall`].
    pub fn host(operation: &'static str, module: impl Into<String>, source: HostError) -> Self {
        Self::HostNativeCall {
            operation,
            module: module.into(),
            source,
        }
    }

    /// Build a [`ReloadError::LoadFailure`].
    pub fn load(module: impl Into<String>, reason: impl ToString) -> Self {
        Self::LoadFailure {
            module: module.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for reload operations
pub type ReloadResult<T> = Result<T, ReloadError>;
