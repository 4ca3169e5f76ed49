pub mod yt_dlp;
pub mod probe;
pub mod job;
pub mod queue;
pub mod covers;
pub mod crop;
pub mod metadata;
pub mod recrop;

pub use job::{JobOutcome, JobRunner};
pub use queue::QueueProcessor;

use crate::config::DownloadFormat;
use crate::errors::{Result, CoverQueueError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Metadata inferred for one media item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackDetails {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Outcome of a metadata probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub file_name_base: String,
    pub details: TrackDetails,
}

/// Lifecycle of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Consuming,
    Consumed,
    Failed,
}

impl EntryStatus {
    /// Transitions only move forward: pending -> consuming -> {consumed | failed}
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Pending, EntryStatus::Consuming)
                | (EntryStatus::Consuming, EntryStatus::Consumed)
                | (EntryStatus::Consuming, EntryStatus::Failed)
        )
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Pending => write!(f, "pending"),
            EntryStatus::Consuming => write!(f, "consuming"),
            EntryStatus::Consumed => write!(f, "consumed"),
            EntryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One requested download, a single item or a playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: u64,
    pub url: String,
    pub format: DownloadFormat,
    pub source_profile: String,
    pub status: EntryStatus,
    /// Playlist-relative progress, 0 to 100
    pub percentage: f64,
}

impl QueueEntry {
    pub fn new(id: u64, url: String, format: DownloadFormat, source_profile: String) -> Self {
        Self {
            id,
            url,
            format,
            source_profile,
            status: EntryStatus::Pending,
            percentage: 0.0,
        }
    }

    /// Move to the next status, rejecting anything but a forward step
    pub fn advance(&mut self, next: EntryStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoverQueueError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Everything the queue publishes to its caller
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// Full ordered queue after a mutation
    Snapshot(Vec<QueueEntry>),
    /// Human-readable progress for the active job
    Progress(String),
    /// A job finished post-processing
    JobComplete { url: String, output: PathBuf },
    /// The drain loop exited
    QueueFinished,
    /// A user-visible failure message
    Error(String),
}

/// Publisher side of the queue event stream
#[derive(Debug, Clone, Default)]
pub struct QueueEvents {
    sender: Option<mpsc::UnboundedSender<QueueEvent>>,
}

impl QueueEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// A publisher that drops everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    fn send(&self, event: QueueEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn snapshot(&self, entries: Vec<QueueEntry>) {
        self.send(QueueEvent::Snapshot(entries));
    }

    pub fn progress(&self, message: String) {
        self.send(QueueEvent::Progress(message));
    }

    pub fn job_complete(&self, url: &str, output: PathBuf) {
        self.send(QueueEvent::JobComplete { url: url.to_string(), output });
    }

    pub fn queue_finished(&self) {
        self.send(QueueEvent::QueueFinished);
    }

    pub fn error(&self, message: String) {
        self.send(QueueEvent::Error(message));
    }
}

/// Arguments for one full download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub output: PathBuf,
    pub format: DownloadFormat,
    pub source_profile: String,
}

/// A single progress line from the downloader
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressReading {
    Percent(f64),
    /// A progress line whose percent field did not parse
    NotANumber,
}

/// Events observed on a running download
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Progress(ProgressReading),
    /// Process exited, with its exit code when it has one
    Close(Option<i32>),
    Error(String),
}

#[derive(Debug, Default)]
struct KillState {
    notify: Notify,
    requested: AtomicBool,
}

/// Request forced termination of a running process
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    state: Arc<KillState>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        if !self.state.requested.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_one();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Resolves once `kill` has been called
    pub async fn requested(&self) {
        if self.is_requested() {
            return;
        }
        self.state.notify.notified().await;
    }
}

/// Handle on a spawned download
#[derive(Debug)]
pub struct DownloadProcess {
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    pub kill: KillSwitch,
}

/// The external media downloader
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Metadata-only run; returns the raw JSON description of one item
    async fn probe(&self, url: &str, source_profile: &str) -> Result<String>;

    /// Flat listing of item identifiers in a playlist
    async fn list_playlist(&self, playlist_url: &str, source_profile: &str) -> Result<Vec<String>>;

    /// Start a full download and stream its events
    fn spawn_download(&self, request: &DownloadRequest) -> Result<DownloadProcess>;
}

/// Inputs for post-download processing of one job
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub details: TrackDetails,
}

/// Post-download stage (artwork and tags)
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<()>;
}
