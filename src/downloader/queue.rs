use crate::config::DownloadFormat;
use crate::downloader::{EntryStatus, JobOutcome, JobRunner, MediaTool, PostProcessor, QueueEntry, QueueEvents};
use crate::errors::{Result, CoverQueueError};
use crate::settings::Settings;
use crate::utils::Utils;
use crate::workspace::ScratchWorkspace;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Totals for one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub consumed: usize,
    pub failed: usize,
}

/// Clears the in-progress flag however the drain ends
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the download queue and drains it one job at a time
pub struct QueueProcessor {
    entries: Mutex<Vec<QueueEntry>>,
    next_id: AtomicU64,
    draining: AtomicBool,
    runner: JobRunner,
    tool: Arc<dyn MediaTool>,
    settings: Arc<RwLock<Settings>>,
    workspace: ScratchWorkspace,
    events: QueueEvents,
    item_delay: Duration,
    listing_timeout: Duration,
}

impl QueueProcessor {
    pub fn new(
        tool: Arc<dyn MediaTool>,
        post: Arc<dyn PostProcessor>,
        settings: Arc<RwLock<Settings>>,
        events: QueueEvents,
    ) -> Self {
        let config = match settings.read() {
            Ok(guard) => guard.config().clone(),
            Err(poisoned) => poisoned.into_inner().config().clone(),
        };
        let workspace = ScratchWorkspace::new(config.scratch_dir());
        let runner = JobRunner::new(Arc::clone(&tool), post, workspace.clone(), &config, events.clone());

        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            draining: AtomicBool::new(false),
            runner,
            tool,
            settings,
            workspace,
            events,
            item_delay: config.timeouts.item_delay(),
            listing_timeout: config.timeouts.playlist_listing(),
        }
    }

    /// Append a pending entry and publish the queue
    pub fn submit(&self, url: &str, format: DownloadFormat, source_profile: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = QueueEntry::new(id, url.trim().to_string(), format, source_profile.to_string());
        tracing::info!("Queued {} ({}) as #{}", entry.url, format, id);

        self.with_entries(|entries| entries.push(entry));
        id
    }

    /// Current queue contents
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.lock_entries().clone()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Process every pending entry in submission order
    pub async fn drain(&self) -> Result<DrainSummary> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return Err(CoverQueueError::DrainInProgress);
        }
        let _guard = DrainGuard(&self.draining);

        let Some(folder) = self.download_folder() else {
            let err = CoverQueueError::NoFolderConfigured;
            tracing::error!("{}", err);
            self.events.error(err.to_string());
            return Err(err);
        };

        match self.workspace.purge().await {
            Ok(removed) => tracing::debug!("Scratch workspace cleared ({} files)", removed),
            Err(e) => tracing::warn!("Could not prepare scratch workspace {}: {}", self.workspace.root().display(), e),
        }

        let mut summary = DrainSummary::default();

        while let Some(entry) = self.take_next_pending() {
            let result = self.consume(&entry, &folder).await;

            let (status, complete) = match result {
                Ok(timed_out) => {
                    if timed_out > 0 {
                        tracing::warn!("Entry #{} ({}): {} item(s) timed out", entry.id, entry.url, timed_out);
                    }
                    summary.consumed += 1;
                    (EntryStatus::Consumed, timed_out == 0)
                }
                Err(e) => {
                    tracing::error!("Entry #{} ({}) failed: {}", entry.id, entry.url, e);
                    summary.failed += 1;
                    (EntryStatus::Failed, false)
                }
            };
            self.settle_entry(entry.id, status, complete);
        }

        tracing::info!("Finished downloads: {} consumed, {} failed", summary.consumed, summary.failed);
        self.events.queue_finished();
        Ok(summary)
    }

    /// Run an entry's jobs; `Ok` carries the number of playlist items that timed out
    async fn consume(&self, entry: &QueueEntry, folder: &Path) -> Result<usize> {
        match Utils::playlist_id(&entry.url) {
            Some(list_id) => self.consume_playlist(entry, &list_id, folder).await,
            None => match self.runner.run(&entry.url, entry.format, &entry.source_profile, folder).await {
                JobOutcome::TimedOut => Err(CoverQueueError::DownloadProcess(format!(
                    "{} did not finish in time",
                    entry.url
                ))),
                _ => Ok(0),
            },
        }
    }

    async fn consume_playlist(&self, entry: &QueueEntry, list_id: &str, folder: &Path) -> Result<usize> {
        let playlist_url = Utils::playlist_url(list_id);

        let ids = tokio::time::timeout(
            self.listing_timeout,
            self.tool.list_playlist(&playlist_url, &entry.source_profile),
        )
        .await
        .map_err(|_| CoverQueueError::PlaylistListingFailed(format!(
            "no listing for {} within {:?}",
            playlist_url, self.listing_timeout
        )))??;

        if ids.is_empty() {
            return Err(CoverQueueError::PlaylistListingFailed(format!("{} listed no items", playlist_url)));
        }

        let total = ids.len();
        let mut timed_out = 0;
        for (index, id) in ids.iter().enumerate() {
            let percentage = Utils::round2(100.0 * index as f64 / total as f64);
            self.with_entries(|entries| {
                if let Some(e) = entries.iter_mut().find(|e| e.id == entry.id) {
                    e.percentage = percentage;
                }
            });

            tracing::info!("Trying to download song {} out of {}", index + 1, total);
            let item_url = Utils::item_url(id);
            if self.runner.run(&item_url, entry.format, &entry.source_profile, folder).await == JobOutcome::TimedOut {
                tracing::error!("Playlist item {} timed out", item_url);
                timed_out += 1;
            }

            if index + 1 < total {
                tokio::time::sleep(self.item_delay).await;
            }
        }

        Ok(timed_out)
    }

    fn download_folder(&self) -> Option<PathBuf> {
        match self.settings.read() {
            Ok(settings) => settings.download_folder(),
            Err(poisoned) => poisoned.into_inner().download_folder(),
        }
    }

    /// Mark the oldest pending entry as consuming and hand back a copy
    fn take_next_pending(&self) -> Option<QueueEntry> {
        let (taken, snapshot) = {
            let mut entries = self.lock_entries();
            let entry = entries.iter_mut().find(|e| e.status == EntryStatus::Pending)?;
            entry.advance(EntryStatus::Consuming).ok()?;
            let taken = entry.clone();
            (taken, entries.clone())
        };
        self.events.snapshot(snapshot);
        Some(taken)
    }

    fn settle_entry(&self, id: u64, status: EntryStatus, complete: bool) {
        self.with_entries(|entries| {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                if let Err(e) = entry.advance(status) {
                    tracing::warn!("Entry #{}: {}", id, e);
                }
                if complete {
                    entry.percentage = 100.0;
                }
            }
        });
    }

    /// Mutate the queue and publish the resulting snapshot
    fn with_entries<T>(&self, f: impl FnOnce(&mut Vec<QueueEntry>) -> T) -> T {
        let (result, snapshot) = {
            let mut entries = self.lock_entries();
            let result = f(&mut entries);
            (result, entries.clone())
        };
        self.events.snapshot(snapshot);
        result
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<QueueEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{FakeTool, RecordingPostProcessor};
    use crate::config::Config;
    use crate::downloader::{ProcessEvent, ProgressReading, QueueEvent};
    use tokio::sync::mpsc;

    struct Harness {
        queue: QueueProcessor,
        tool: Arc<FakeTool>,
        receiver: mpsc::UnboundedReceiver<QueueEvent>,
        _dir: tempfile::TempDir,
    }

    fn harness(with_folder: bool) -> Harness {
        harness_with_script(with_folder, vec![ProcessEvent::Close(Some(0))])
    }

    fn harness_with_script(with_folder: bool, script: Vec<ProcessEvent>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut config = Config::default();
        config.scratch_directory = Some(dir.path().join("temp"));
        config.timeouts.probe_attempts = 1;
        config.save_to(&path).unwrap();

        let mut settings = Settings::load_from(&path).unwrap();
        if with_folder {
            settings.set_download_folder(dir.path().join("music")).unwrap();
        }

        let tool = Arc::new(FakeTool::with_script(script));
        let (events, receiver) = QueueEvents::channel();
        let queue = QueueProcessor::new(
            tool.clone(),
            Arc::new(RecordingPostProcessor::default()),
            Arc::new(RwLock::new(settings)),
            events,
        );

        Harness { queue, tool, receiver, _dir: dir }
    }

    fn published(receiver: &mut mpsc::UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn statuses_of(events: &[QueueEvent], id: u64) -> Vec<EntryStatus> {
        let mut seen: Vec<EntryStatus> = Vec::new();
        for event in events {
            if let QueueEvent::Snapshot(entries) = event {
                if let Some(e) = entries.iter().find(|e| e.id == id) {
                    if seen.last() != Some(&e.status) {
                        seen.push(e.status);
                    }
                }
            }
        }
        seen
    }

    #[tokio::test]
    async fn empty_queue_still_reports_finished() {
        let mut h = harness(true);

        let summary = h.queue.drain().await.unwrap();

        assert_eq!(summary, DrainSummary::default());
        assert_eq!(published(&mut h.receiver), vec![QueueEvent::QueueFinished]);
    }

    #[tokio::test]
    async fn missing_folder_aborts_before_touching_entries() {
        let mut h = harness(false);
        h.queue.submit("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome");

        let result = h.queue.drain().await;

        assert!(matches!(result, Err(CoverQueueError::NoFolderConfigured)));
        assert_eq!(h.queue.snapshot()[0].status, EntryStatus::Pending);
        assert!(h.tool.spawned_urls().is_empty());

        let events = published(&mut h.receiver);
        assert!(events.contains(&QueueEvent::Error(
            "No folder selected. Please select a download folder first.".to_string()
        )));
        assert!(!events.contains(&QueueEvent::QueueFinished));
        assert!(!h.queue.is_draining());
    }

    #[tokio::test]
    async fn entries_drain_in_submission_order() {
        let mut h = harness(true);
        let first = h.queue.submit("https://www.youtube.com/watch?v=one", DownloadFormat::AudioCompressed, "chrome");
        h.queue.submit("https://www.youtube.com/watch?v=two&t=30", DownloadFormat::OriginalContainer, "firefox");

        let summary = h.queue.drain().await.unwrap();

        assert_eq!(summary.consumed, 2);
        assert_eq!(
            h.tool.spawned_urls(),
            vec!["https://www.youtube.com/watch?v=one", "https://www.youtube.com/watch?v=two"]
        );
        assert_eq!(h.tool.spawned.lock().unwrap()[1].0.source_profile, "firefox");

        let events = published(&mut h.receiver);
        assert_eq!(
            statuses_of(&events, first),
            vec![EntryStatus::Pending, EntryStatus::Consuming, EntryStatus::Consumed]
        );
        assert_eq!(events.last(), Some(&QueueEvent::QueueFinished));
    }

    #[tokio::test(start_paused = true)]
    async fn playlist_items_run_in_order_with_delay() {
        let mut h = harness(true);
        h.tool.set_playlist(Ok(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
        let id = h.queue.submit("https://www.youtube.com/watch?v=a&list=PL1", DownloadFormat::AudioCompressed, "chrome");

        h.queue.drain().await.unwrap();

        let spawned = h.tool.spawned.lock().unwrap().clone();
        let urls: Vec<_> = spawned.iter().map(|(r, _)| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=a",
                "https://www.youtube.com/watch?v=b",
                "https://www.youtube.com/watch?v=c",
            ]
        );
        for pair in spawned.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(10));
        }

        let percentages: Vec<f64> = published(&mut h.receiver)
            .into_iter()
            .filter_map(|event| match event {
                QueueEvent::Snapshot(entries) => entries.into_iter().find(|e| e.id == id).map(|e| e.percentage),
                _ => None,
            })
            .collect();
        assert!(percentages.contains(&33.33));
        assert!(percentages.contains(&66.67));
        assert_eq!(percentages.last(), Some(&100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_item_marks_entry_failed() {
        let h = harness_with_script(true, vec![ProcessEvent::Progress(ProgressReading::Percent(3.0))]);
        let id = h.queue.submit("https://www.youtube.com/watch?v=long", DownloadFormat::AudioCompressed, "chrome");

        let summary = h.queue.drain().await.unwrap();

        assert_eq!(summary, DrainSummary { consumed: 0, failed: 1 });
        assert!(h.tool.any_killed());
        let entry = h.queue.snapshot().into_iter().find(|e| e.id == id).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert_eq!(entry.percentage, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_playlist_items_keep_partial_percentage() {
        let h = harness_with_script(true, vec![ProcessEvent::Progress(ProgressReading::Percent(3.0))]);
        h.tool.set_playlist(Ok(vec!["a".to_string(), "b".to_string()]));
        let id = h.queue.submit("https://www.youtube.com/playlist?list=PL1", DownloadFormat::AudioCompressed, "chrome");

        let summary = h.queue.drain().await.unwrap();

        assert_eq!(summary.consumed, 1);
        assert_eq!(h.tool.spawned_urls().len(), 2);
        let entry = h.queue.snapshot().into_iter().find(|e| e.id == id).unwrap();
        assert_eq!(entry.status, EntryStatus::Consumed);
        assert_eq!(entry.percentage, 50.0);
    }

    #[tokio::test]
    async fn listing_failure_marks_entry_failed_and_continues() {
        let mut h = harness(true);
        h.tool.set_playlist(Err(CoverQueueError::PlaylistListingFailed("exit 1".to_string())));
        let playlist = h.queue.submit("https://www.youtube.com/playlist?list=PL1", DownloadFormat::AudioCompressed, "chrome");
        let single = h.queue.submit("https://www.youtube.com/watch?v=solo", DownloadFormat::AudioCompressed, "chrome");

        let summary = h.queue.drain().await.unwrap();

        assert_eq!(summary, DrainSummary { consumed: 1, failed: 1 });
        let entries = h.queue.snapshot();
        assert_eq!(entries.iter().find(|e| e.id == playlist).unwrap().status, EntryStatus::Failed);
        assert_eq!(entries.iter().find(|e| e.id == single).unwrap().status, EntryStatus::Consumed);

        let events = published(&mut h.receiver);
        assert_eq!(
            statuses_of(&events, playlist),
            vec![EntryStatus::Pending, EntryStatus::Consuming, EntryStatus::Failed]
        );
    }

    #[tokio::test]
    async fn empty_listing_is_a_failure() {
        let h = harness(true);
        h.tool.set_playlist(Ok(Vec::new()));
        h.queue.submit("https://www.youtube.com/playlist?list=PL1", DownloadFormat::AudioCompressed, "chrome");

        let summary = h.queue.drain().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(h.tool.spawned_urls().is_empty());
    }

    #[tokio::test]
    async fn drain_purges_scratch_workspace() {
        let h = harness(true);
        let leftover = h._dir.path().join("temp").join("stale.webm");
        std::fs::create_dir_all(leftover.parent().unwrap()).unwrap();
        std::fs::write(&leftover, b"x").unwrap();

        h.queue.drain().await.unwrap();

        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn second_concurrent_drain_is_rejected() {
        let h = harness(true);
        h.queue.draining.store(true, Ordering::SeqCst);

        assert!(matches!(h.queue.drain().await, Err(CoverQueueError::DrainInProgress)));
        assert!(h.queue.is_draining());
    }
}
