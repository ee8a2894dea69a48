//! Module archive packaging

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use fastswap_kernel::ModuleManifest;

use super::loader::{LoadError, MANIFEST_ENTRY};

/// Write `manifest` into a new archive at `path`, replacing any existing file.
pub fn write_archive(path: &Path, manifest: &ModuleManifest) -> Result<(), LoadError> {
    write_archive_with(path, manifest, std::iter::empty::<(&str, &[u8])>())
}

/// Write an archive carrying `manifest` plus extra entries.
pub fn write_archive_with<'a, I>(
    path: &Path,
    manifest: &ModuleManifest,
    entries: I,
) -> Result<(), LoadError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let yaml = manifest.to_yaml_string().map_err(|source| LoadError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;

    let archive_err = |source| LoadError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default();

    writer.start_file(MANIFEST_ENTRY, options).map_err(archive_err)?;
    writer.write_all(yaml.as_bytes())?;

    for (name, bytes) in entries {
        writer.start_file(name, options).map_err(archive_err)?;
        writer.write_all(bytes)?;
    }

    writer.finish().map_err(archive_err)?;
    Ok(())
}
