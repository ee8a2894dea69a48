use std::path::PathBuf;

use fastswap_kernel::ManifestError;
use fastswap_kernel::config::ConfigError;
use fastswap_runtime::ReloadError;
use fastswap_runtime::hot_reload::LoadError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest error in {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] LoadError),

    #[error("Reload error: {0}")]
    Reload(#[from] ReloadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
