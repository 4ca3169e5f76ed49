use crate::downloader::{MediaTool, ProbeResult, TrackDetails};
use crate::errors::{Result, CoverQueueError};
use crate::utils::Utils;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Subset of the downloader's JSON description we rely on
#[derive(Debug, Default, Deserialize)]
struct ProbeInfo {
    artist: Option<String>,
    album: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    fulltitle: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

/// Best-effort metadata lookup ahead of a download
pub struct MetadataProber {
    tool: Arc<dyn MediaTool>,
    attempt_timeout: Duration,
    attempts: u32,
    thumbnail_marker: String,
}

impl MetadataProber {
    pub fn new(tool: Arc<dyn MediaTool>, attempt_timeout: Duration, attempts: u32, thumbnail_marker: String) -> Self {
        Self {
            tool,
            attempt_timeout,
            attempts: attempts.max(1),
            thumbnail_marker,
        }
    }

    /// Probe an item, falling back to a timestamped name with no details
    pub async fn probe(&self, url: &str, source_profile: &str) -> ProbeResult {
        match self.try_probe(url, source_profile).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Track information unavailable for {}: {}", url, e);
                ProbeResult {
                    file_name_base: Utils::fallback_file_name(),
                    details: TrackDetails::default(),
                }
            }
        }
    }

    /// Await one in-flight invocation across attempts; only a finished but
    /// unusable invocation is replaced by a fresh one.
    async fn try_probe(&self, url: &str, source_profile: &str) -> Result<ProbeResult> {
        let mut in_flight: Option<JoinHandle<Result<String>>> = None;
        let mut last_error = CoverQueueError::ProbeFailed(format!(
            "no response within {} attempts of {:?}",
            self.attempts, self.attempt_timeout
        ));

        for attempt in 1..=self.attempts {
            let handle = in_flight.get_or_insert_with(|| self.spawn_probe(url, source_profile));

            let joined = match tokio::time::timeout(self.attempt_timeout, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::debug!("Probe attempt {} for {} timed out", attempt, url);
                    continue;
                }
            };
            in_flight = None;

            let parsed = joined
                .map_err(|e| CoverQueueError::ProbeFailed(format!("probe task failed: {}", e)))
                .and_then(|output| output)
                .and_then(|json| self.parse(&json));

            match parsed {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!("Probe attempt {} for {} failed: {}", attempt, url, e);
                    last_error = e;
                }
            }
        }

        if let Some(handle) = in_flight {
            handle.abort();
        }
        Err(last_error)
    }

    fn spawn_probe(&self, url: &str, source_profile: &str) -> JoinHandle<Result<String>> {
        let tool = Arc::clone(&self.tool);
        let url = url.to_string();
        let source_profile = source_profile.to_string();
        tokio::spawn(async move { tool.probe(&url, &source_profile).await })
    }

    fn parse(&self, json: &str) -> Result<ProbeResult> {
        let info: ProbeInfo = serde_json::from_str(json.trim())?;

        let artist = Utils::sanitize_field(info.artist.as_deref())
            .or_else(|| Utils::sanitize_field(info.uploader.as_deref()));
        let album = Utils::sanitize_field(info.album.as_deref());
        let title = Utils::sanitize_field(info.title.as_deref())
            .or_else(|| Utils::sanitize_field(info.fulltitle.as_deref()));

        let file_name_base = [&artist, &album, &title]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" - ");

        if file_name_base.is_empty() {
            return Err(CoverQueueError::ProbeFailed("no naming fields in probe output".to_string()));
        }

        let thumbnail_url = info
            .thumbnails
            .into_iter()
            .filter_map(|t| t.url)
            .find(|url| url.contains(&self.thumbnail_marker));

        if thumbnail_url.is_none() {
            tracing::info!("No '{}' thumbnail reported; artwork will be skipped", self.thumbnail_marker);
        }

        Ok(ProbeResult {
            file_name_base,
            details: TrackDetails { artist, album, title, thumbnail_url },
        })
    }
}
