use crate::errors::Result;
use crate::utils::fs::TempFile;
use std::path::{Path, PathBuf};

/// Purgeable directory for intermediate downloads and cover art
#[derive(Debug, Clone)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if absent, otherwise delete every file in it.
    ///
    /// Per-file failures are logged and skipped. Returns the number of files removed.
    pub async fn purge(&self) -> Result<usize> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.root).await?;
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("Deleted: {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::error!("Error deleting {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    /// Path for a named file inside the workspace
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Unique scratch file, unlinked when the guard drops
    pub fn temp_file(&self, prefix: &str, extension: &str) -> TempFile {
        let id = uuid::Uuid::new_v4().simple().to_string();
        TempFile::new(self.root.join(format!("{}_{}.{}", prefix, &id[..12], extension)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn purge_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = ScratchWorkspace::new(dir.path().join("temp"));

        assert_eq!(workspace.purge().await.unwrap(), 0);
        assert!(workspace.root().is_dir());
    }

    #[tokio::test]
    async fn purge_deletes_files_but_keeps_directories() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = ScratchWorkspace::new(dir.path().to_path_buf());
        std::fs::write(workspace.file_path("a.mp3"), b"a").unwrap();
        std::fs::write(workspace.file_path("b.webm"), b"b").unwrap();
        std::fs::create_dir(workspace.file_path("nested")).unwrap();

        assert_eq!(workspace.purge().await.unwrap(), 2);
        assert!(!workspace.file_path("a.mp3").exists());
        assert!(workspace.file_path("nested").is_dir());
    }

    #[test]
    fn temp_files_get_distinct_names() {
        let workspace = ScratchWorkspace::new(PathBuf::from("/scratch"));
        let a = workspace.temp_file("cover", "img");
        let b = workspace.temp_file("cover", "img");

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with("/scratch"));
        assert_eq!(a.path().extension().unwrap(), "img");
    }
}
