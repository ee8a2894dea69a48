//! `fastswap pack` command implementation

use crate::CliError;
use colored::Colorize;
use fastswap_kernel::ModuleManifest;
use fastswap_runtime::hot_reload::{DEFAULT_EXTENSION, write_archive_with};
use std::path::{Path, PathBuf};

/// Execute the `fastswap pack` command
pub fn run(manifest_path: &Path, files: &[PathBuf], output: Option<&Path>) -> Result<(), CliError> {
    let content = std::fs::read_to_string(manifest_path)?;
    let manifest =
        ModuleManifest::from_yaml_str(&content).map_err(|source| CliError::Manifest {
            path: manifest_path.to_path_buf(),
            source,
        })?;

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::Other(format!("{} is not a file", file.display())))?;
        entries.push((name, std::fs::read(file)?));
    }

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(format!("{}.{}", manifest.name, DEFAULT_EXTENSION))
    });

    write_archive_with(
        &output,
        &manifest,
        entries.iter().map(|(name, data)| (name.as_str(), data.as_slice())),
    )?;

    println!(
        "{} Packed {} {} into {}",
        "✓".green(),
        manifest.name.cyan(),
        manifest.version,
        output.display()
    );
    Ok(())
}
