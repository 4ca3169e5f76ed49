use crate::errors::Result;
use std::path::{Path, PathBuf};

/// Scratch file that is unlinked when dropped, whether or not it was ever written
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the file to its final location, consuming the guard
    pub async fn persist(self, destination: &Path) -> Result<()> {
        FileUtils::move_file(&self.path, destination).await
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        FileUtils::remove_best_effort(&self.path);
    }
}

/// File system utilities
pub struct FileUtils;

impl FileUtils {
    /// Delete a file, swallowing every failure
    pub fn remove_best_effort(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!("Removed temp file: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!("Could not remove temp file {}: {}", path.display(), e),
        }
    }

    /// Move file, falling back to copy + delete across file systems
    pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if tokio::fs::rename(from, to).await.is_ok() {
            return Ok(());
        }

        tokio::fs::copy(from, to).await?;
        Self::remove_best_effort(from);
        Ok(())
    }
}
