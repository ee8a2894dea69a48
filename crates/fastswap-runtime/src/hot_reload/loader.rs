//! Descriptor loader
//!
//! Scans the module directory for archives and reads their manifests

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use fastswap_kernel::{
    HostError, ManifestError, ModuleHost, ModuleManifest, ModuleRef, ReloadError,
};

/// Name of the manifest entry inside a module archive.
pub const MANIFEST_ENTRY: &str = "module.yml";

/// Archive extension scanned by default.
pub const DEFAULT_EXTENSION: &str = "zip";

/// Archive load error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Archive {0:?} has no module.yml entry")]
    MissingManifest(PathBuf),

    #[error("Invalid manifest in {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("No archive declares module \"{0}\"")]
    ArchiveNotFound(String),

    #[error("Host refused {path:?}: {source}")]
    Host {
        path: PathBuf,
        #[source]
        source: HostError,
    },
}

impl LoadError {
    /// Map onto the reload taxonomy for a request targeting `module`.
    pub fn into_reload_error(self, module: &str) -> ReloadError {
        match self {
            LoadError::Manifest { path, source } => ReloadError::ManifestParse { path, source },
            other => ReloadError::load(module, other),
        }
    }
}

/// Finds and reads module archives in one directory.
#[derive(Debug, Clone)]
pub struct DescriptorLoader {
    /// Directory scanned (non-recursively)
    directory: PathBuf,
    /// Archive extension, compared case-insensitively
    extension: String,
}

impl DescriptorLoader {
    /// Create a loader over `directory` using [`DEFAULT_EXTENSION`]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Set archive extension
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Directory scanned
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether `path` carries the archive extension
    pub fn is_archive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// Archive files directly inside the directory, sorted by path.
    pub fn list_archives(&self) -> Result<Vec<PathBuf>, LoadError> {
        let mut archives = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file() && self.is_archive(&path) {
                archives.push(path);
            }
        }
        archives.sort();
        Ok(archives)
    }

    /// Read and validate the manifest of one archive.
    pub fn parse_manifest(&self, archive: &Path) -> Result<ModuleManifest, LoadError> {
        let archive_err = |source| LoadError::Archive {
            path: archive.to_path_buf(),
            source,
        };

        let mut zip = ZipArchive::new(File::open(archive)?).map_err(archive_err)?;
        let mut entry = match zip.by_name(MANIFEST_ENTRY) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(LoadError::MissingManifest(archive.to_path_buf()));
            }
            Err(e) => return Err(archive_err(e)),
        };

        let mut content = String::new();
        entry.read_to_string(&mut content)?;

        ModuleManifest::from_yaml_str(&content).map_err(|source| LoadError::Manifest {
            path: archive.to_path_buf(),
            source,
        })
    }

    /// Every archive whose manifest parses, in path order. Failures are skipped.
    pub fn describe_all(&self) -> Vec<(PathBuf, ModuleManifest)> {
        let archives = match self.list_archives() {
            Ok(archives) => archives,
            Err(e) => {
                warn!("Failed to list module directory {:?}: {}", self.directory, e);
                return Vec::new();
            }
        };

        archives
            .into_iter()
            .filter_map(|path| match self.parse_manifest(&path) {
                Ok(manifest) => Some((path, manifest)),
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    }

    /// First archive whose declared name equals `module_name` exactly.
    pub fn find_archive(&self, module_name: &str) -> Option<PathBuf> {
        self.describe_all()
            .into_iter()
            .find(|(_, manifest)| manifest.name == module_name)
            .map(|(path, _)| path)
    }

    /// Validate the manifest, then hand the archive to the host's loader.
    ///
    /// Nothing is registered when the manifest is invalid.
    pub fn load_archive(
        &self,
        host: &dyn ModuleHost,
        archive: &Path,
    ) -> Result<ModuleRef, LoadError> {
        let manifest = self.parse_manifest(archive)?;
        debug!(module = %manifest.name, "Loading module from {:?}", archive);

        host.load_module(archive).map_err(|source| LoadError::Host {
            path: archive.to_path_buf(),
            source,
        })
    }
}
