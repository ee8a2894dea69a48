//! Configuration loading
//!
//! Reads fastswap's own settings file. The loader supports YAML, TOML, JSON,
//! INI, RON and JSON5, detected from the file extension, with `${VAR}` / `$VAR` substitution
//! applied before parsing.
//!
//! ```yaml
//! only_modules: true
//! auto_reload: true
//! auto_reload_check_ticks: 20
//! in_chat_reload: true
//! filter_mode: Blacklist
//! filter_list:
//!   - core-utils
//! ```

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::policy::{FilterMode, ReloadMode, ReloadPolicy};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Contents written when no settings file exists yet.
pub const DEFAULT_CONFIG_YAML: &str = r#"# Reload only modules (true) or the whole host (false) when no module is named
only_modules: true
# Watch the module directory and reload changed archives
auto_reload: true
# Watch period in ticks (20 ticks = 1 second)
auto_reload_check_ticks: 20
# Let "r", "rl" and "reload" typed in chat trigger a reload
in_chat_reload: true
# Whitelist or Blacklist
filter_mode: Blacklist
# Module names the filter applies to
filter_list: []
"#;

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced variable pattern is valid")
});

static SIMPLE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("simple variable pattern is valid")
});

/// fastswap settings as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastSwapConfig {
    /// Reload modules only (true) or the whole host (false)
    pub only_modules: bool,
    /// Run the auto-reload watcher
    pub auto_reload: bool,
    /// Watcher period in ticks
    pub auto_reload_check_ticks: u32,
    /// Accept chat phrases as triggers
    pub in_chat_reload: bool,
    /// `Whitelist` or `Blacklist`, any case
    pub filter_mode: String,
    /// Module names the filter applies to
    pub filter_list: Vec<String>,
}

impl Default for FastSwapConfig {
    fn default() -> Self {
        Self {
            only_modules: true,
            auto_reload: true,
            auto_reload_check_ticks: 20,
            in_chat_reload: true,
            filter_mode: "Blacklist".to_string(),
            filter_list: Vec::new(),
        }
    }
}

impl FastSwapConfig {
    /// Load from a file, falling back to defaults for absent keys.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        load_config(path)
    }

    /// Load from a file, then apply `FASTSWAP_*` environment overrides.
    pub fn load_with_env(path: impl AsRef<Path>) -> ConfigResult<Self> {
        load_with_env(path, "FASTSWAP")
    }

    /// Write [`DEFAULT_CONFIG_YAML`] unless the file already exists.
    pub fn write_default_if_missing(path: impl AsRef<Path>) -> ConfigResult<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG_YAML)?;
        Ok(true)
    }

    /// Build an immutable policy snapshot.
    pub fn to_policy(&self) -> ReloadPolicy {
        ReloadPolicy::new()
            .with_mode(if self.only_modules {
                ReloadMode::ModulesOnly
            } else {
                ReloadMode::Full
            })
            .with_filter_mode(FilterMode::from_name(&self.filter_mode))
            .with_filter_list(&self.filter_list)
            .with_auto_reload(self.auto_reload)
            .with_poll_interval_ticks(self.auto_reload_check_ticks)
            .with_in_chat_reload(self.in_chat_reload)
    }
}

/// Detect configuration format from file extension
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
/// - INI: `.ini`
/// - RON: `.ron`
/// - JSON5: `.json5`
pub fn detect_format(path: impl AsRef<Path>) -> ConfigResult<FileFormat> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME`. Unknown variables are left
/// untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let result = BRACED_VAR
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();

    SIMPLE_VAR
        .replace_all(&result, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
}

/// Load configuration from a file
///
/// ```rust,ignore
/// use fastswap_kernel::config::{load_config, FastSwapConfig};
///
/// let config: FastSwapConfig = load_config("fastswap.yml")?;
/// ```
pub fn load_config<T>(path: impl AsRef<Path>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted_content = substitute_env_vars(content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted_content, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration with environment variable overrides
///
/// Variables are named `<PREFIX>_<KEY>`, e.g. `FASTSWAP_AUTO_RELOAD=false`.
pub fn load_with_env<T>(path: impl AsRef<Path>, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}
