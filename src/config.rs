use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::errors::{Result, CoverQueueError};

/// Current on-disk settings layout
pub const CONFIG_VERSION: u32 = 1;

/// Requested output of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadFormat {
    /// Audio-only extraction re-encoded to mp3
    #[value(name = "mp3", alias = "audio-compressed")]
    AudioCompressed,
    /// Best audio stream in its original container
    #[value(name = "original", alias = "original-container")]
    OriginalContainer,
}

impl DownloadFormat {
    /// File extension used for temp and final output paths
    pub fn extension(&self) -> &'static str {
        match self {
            DownloadFormat::AudioCompressed => "mp3",
            DownloadFormat::OriginalContainer => "webm",
        }
    }
}

impl std::fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadFormat::AudioCompressed => write!(f, "audio-compressed"),
            DownloadFormat::OriginalContainer => write!(f, "original-container"),
        }
    }
}

impl std::str::FromStr for DownloadFormat {
    type Err = CoverQueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mp3" | "audio-compressed" => Ok(DownloadFormat::AudioCompressed),
            "original" | "original-container" | "webm" => Ok(DownloadFormat::OriginalContainer),
            _ => Err(CoverQueueError::InvalidFormat(s.to_string())),
        }
    }
}

/// External binaries the queue drives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolPaths {
    pub downloader: PathBuf,
    /// Directory or binary handed to the downloader for audio extraction
    pub converter: Option<PathBuf>,
    /// Crop worker executable, defaults to this binary
    pub crop_worker: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            downloader: PathBuf::from("yt-dlp"),
            converter: None,
            crop_worker: None,
        }
    }
}

/// Bounded-waiting knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    pub probe_secs: u64,
    pub probe_attempts: u32,
    pub job_secs: u64,
    pub playlist_listing_secs: u64,
    pub item_delay_secs: u64,
    pub kill_on_timeout: bool,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: 30,
            probe_attempts: 4,
            job_secs: 120,
            playlist_listing_secs: 120,
            item_delay_secs: 10,
            kill_on_timeout: true,
        }
    }
}

impl Timeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn job(&self) -> Duration {
        Duration::from_secs(self.job_secs)
    }

    pub fn playlist_listing(&self) -> Duration {
        Duration::from_secs(self.playlist_listing_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub version: u32,
    pub download_folder: Option<PathBuf>,
    pub default_format: DownloadFormat,
    pub source_profile: String,
    pub thumbnail_marker: String,
    pub scratch_directory: Option<PathBuf>,
    pub tools: ToolPaths,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            download_folder: None,
            default_format: DownloadFormat::AudioCompressed,
            source_profile: "chrome".to_string(),
            thumbnail_marker: "hq1.jpg".to_string(),
            scratch_directory: None,
            tools: ToolPaths::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| CoverQueueError::Config("Could not find config directory".to_string()))
            .map(|dir| dir.join("cover-queue"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Scratch workspace root, falling back to the user cache directory
    pub fn scratch_dir(&self) -> PathBuf {
        if let Some(dir) = &self.scratch_directory {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cover-queue")
            .join("temp")
    }

    /// Load configuration from a JSON file, writing defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CoverQueueError::Config(format!("Failed to read settings file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| CoverQueueError::Config(format!("Failed to parse settings file: {}", e)))?;

        if config.version < CONFIG_VERSION {
            tracing::info!("Upgrading settings from version {} to {}", config.version, CONFIG_VERSION);
            config.version = CONFIG_VERSION;
        }

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoverQueueError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let json_content = serde_json::to_string_pretty(self)
            .map_err(|e| CoverQueueError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json_content)
            .map_err(|e| CoverQueueError::Config(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
