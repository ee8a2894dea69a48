use fastswap_kernel::ModuleManifest;
use fastswap_runtime::hot_reload::write_archive;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Manifest for `name` with one command, `<name>-cmd`, lowercased.
pub fn manifest(name: &str) -> ModuleManifest {
    ModuleManifest::new(name, format!("{}::Main", name))
        .with_command(&format!("{}-cmd", name.to_lowercase()), &[])
}

/// A temporary module directory
pub struct ModuleDir {
    dir: TempDir,
}

impl ModuleDir {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Directory holding one default archive per name, `<name>.zip`
    pub fn with_modules(names: &[&str]) -> anyhow::Result<Self> {
        let dir = Self::new()?;
        for name in names {
            dir.write(&format!("{}.zip", name), &manifest(name))?;
        }
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    /// Write (or replace) an archive
    pub fn write(&self, file: &str, manifest: &ModuleManifest) -> anyhow::Result<PathBuf> {
        let path = self.file(file);
        write_archive(&path, manifest)?;
        Ok(path)
    }

    /// Write an archive next to `file`, stamp it, then rename it into place
    /// so a concurrent poll never sees a partial file.
    pub fn replace(
        &self,
        file: &str,
        manifest: &ModuleManifest,
        secs: u64,
    ) -> anyhow::Result<PathBuf> {
        let staging = format!("{}.partial", file);
        self.write(&staging, manifest)?;
        self.touch(&staging, secs)?;
        let path = self.file(file);
        std::fs::rename(self.file(&staging), &path)?;
        Ok(path)
    }

    /// Replace an archive with bytes that are not a zip
    pub fn corrupt(&self, file: &str) -> anyhow::Result<()> {
        std::fs::write(self.file(file), b"truncated upload")?;
        Ok(())
    }

    pub fn remove(&self, file: &str) -> anyhow::Result<()> {
        std::fs::remove_file(self.file(file))?;
        Ok(())
    }

    /// Set the modification time to `secs` after the epoch
    pub fn touch(&self, file: &str, secs: u64) -> anyhow::Result<()> {
        File::options()
            .write(true)
            .open(self.file(file))?
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))?;
        Ok(())
    }
}
