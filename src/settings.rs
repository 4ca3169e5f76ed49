use crate::config::Config;
use crate::errors::Result;
use std::path::{Path, PathBuf};

/// Settings management module
/// This module pairs the configuration record with the file it lives in,
/// so every change is written straight back.
#[derive(Debug, Clone)]
pub struct Settings {
    config: Config,
    path: PathBuf,
}

impl Settings {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let path = Config::settings_path()?;
        Self::load_from(&path)
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Config::load_from(path)?;
        tracing::debug!("Configuration loaded from: {}", path.display());
        Ok(Self { config, path: path.to_path_buf() })
    }

    /// Get a reference to the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the backing settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save the current configuration to file
    pub fn save(&self) -> Result<()> {
        self.config.save_to(&self.path)?;
        tracing::debug!("Configuration saved to: {}", self.path.display());
        Ok(())
    }

    /// Destination folder for finished downloads
    pub fn download_folder(&self) -> Option<PathBuf> {
        self.config.download_folder.clone()
    }

    /// Update the destination folder
    pub fn set_download_folder(&mut self, path: PathBuf) -> Result<()> {
        std::fs::create_dir_all(&path)?;
        self.config.download_folder = Some(path);
        self.save()
    }

    /// Forget the destination folder
    pub fn clear_download_folder(&mut self) -> Result<()> {
        self.config.download_folder = None;
        self.save()
    }

    /// Restore every setting to its default
    pub fn reset(&mut self) -> Result<()> {
        self.config = Config::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_changes_are_persisted_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let target = dir.path().join("music");

        let mut settings = Settings::load_from(&path).unwrap();
        assert!(settings.download_folder().is_none());

        settings.set_download_folder(target.clone()).unwrap();
        assert!(target.is_dir());

        let reloaded = Settings::load_from(&path).unwrap();
        assert_eq!(reloaded.download_folder(), Some(target));

        let mut reloaded = reloaded;
        reloaded.clear_download_folder().unwrap();
        assert!(Settings::load_from(&path).unwrap().download_folder().is_none());
    }
}
