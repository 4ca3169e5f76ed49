use crate::config::{Config, DownloadFormat};
use crate::downloader::probe::MetadataProber;
use crate::downloader::{
    DownloadRequest, FinalizeRequest, KillSwitch, MediaTool, PostProcessor, ProcessEvent, ProgressReading,
    QueueEvents,
};
use crate::utils::Utils;
use crate::workspace::ScratchWorkspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How a single job settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The process exited (possibly after being ended at 100%) and post-processing ran
    Closed,
    /// No terminal event before the job deadline
    TimedOut,
    /// The process reported an error
    Errored,
}

/// One in-flight downloader invocation
#[derive(Debug)]
struct DownloadJob {
    source_url: String,
    format: DownloadFormat,
    output_temp_path: PathBuf,
    output_final_path: PathBuf,
    progress_last: Option<f64>,
    settled: Option<JobOutcome>,
}

impl DownloadJob {
    /// Record the outcome; only the first settlement counts
    fn settle(&mut self, outcome: JobOutcome) -> bool {
        if self.settled.is_some() {
            tracing::debug!("Ignoring late {:?} for {}", outcome, self.source_url);
            return false;
        }
        self.settled = Some(outcome);
        true
    }
}

/// Runs one media item through probe, download and post-processing
pub struct JobRunner {
    tool: Arc<dyn MediaTool>,
    prober: MetadataProber,
    post: Arc<dyn PostProcessor>,
    workspace: ScratchWorkspace,
    job_timeout: Duration,
    kill_on_timeout: bool,
    events: QueueEvents,
}

impl JobRunner {
    pub fn new(
        tool: Arc<dyn MediaTool>,
        post: Arc<dyn PostProcessor>,
        workspace: ScratchWorkspace,
        config: &Config,
        events: QueueEvents,
    ) -> Self {
        let prober = MetadataProber::new(
            Arc::clone(&tool),
            config.timeouts.probe(),
            config.timeouts.probe_attempts,
            config.thumbnail_marker.clone(),
        );

        Self {
            tool,
            prober,
            post,
            workspace,
            job_timeout: config.timeouts.job(),
            kill_on_timeout: config.timeouts.kill_on_timeout,
            events,
        }
    }

    /// Download one item into `destination_dir`
    pub async fn run(
        &self,
        url: &str,
        format: DownloadFormat,
        source_profile: &str,
        destination_dir: &Path,
    ) -> JobOutcome {
        let source_url = Utils::canonical_item_url(url);
        let probe = self.prober.probe(&source_url, source_profile).await;

        let file_name = format!("{}.{}", probe.file_name_base, format.extension());
        let mut job = DownloadJob {
            source_url,
            format,
            output_temp_path: self.workspace.file_path(&file_name),
            output_final_path: destination_dir.join(&file_name),
            progress_last: None,
            settled: None,
        };

        tracing::info!("OutputTemp: {}", job.output_temp_path.display());
        tracing::info!("OutputFinal: {}", job.output_final_path.display());

        let request = DownloadRequest {
            url: job.source_url.clone(),
            output: job.output_temp_path.clone(),
            format: job.format,
            source_profile: source_profile.to_string(),
        };

        let mut process = match self.tool.spawn_download(&request) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!("Download error for {}: {}", job.source_url, e);
                self.events.error(e.to_string());
                job.settle(JobOutcome::Errored);
                return JobOutcome::Errored;
            }
        };

        let kill = process.kill.clone();
        let outcome = match tokio::time::timeout(
            self.job_timeout,
            self.watch(&mut job, &mut process.events, &kill),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("Job for {} timed out after {:?}", job.source_url, self.job_timeout);
                if self.kill_on_timeout {
                    kill.kill();
                }
                JobOutcome::TimedOut
            }
        };
        job.settle(outcome);

        if outcome == JobOutcome::Closed {
            self.finalize(&job, probe.details).await;
        }

        outcome
    }

    /// Consume process events until the process exits or reports an error
    ///
    /// After a kill request the job still settles only on the exit event.
    async fn watch(
        &self,
        job: &mut DownloadJob,
        events: &mut mpsc::UnboundedReceiver<ProcessEvent>,
        kill: &KillSwitch,
    ) -> JobOutcome {
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Progress(ProgressReading::Percent(percent)) => {
                    job.progress_last = Some(percent);
                    self.events.progress(format!("Track Progress: {}", percent));
                }
                ProcessEvent::Progress(ProgressReading::NotANumber) => {
                    if job.progress_last == Some(100.0) && !kill.is_requested() {
                        tracing::info!("Download reported complete, ending process for {}", job.source_url);
                        kill.kill();
                    }
                }
                ProcessEvent::Close(code) => {
                    if code != Some(0) && !kill.is_requested() {
                        tracing::warn!("Downloader exited with {:?} for {}", code, job.source_url);
                    }
                    tracing::info!("Finished download: {}", job.source_url);
                    return JobOutcome::Closed;
                }
                ProcessEvent::Error(message) => {
                    tracing::error!("Download error for {}: {}", job.source_url, message);
                    return JobOutcome::Errored;
                }
            }
        }

        JobOutcome::Closed
    }

    async fn finalize(&self, job: &DownloadJob, details: crate::downloader::TrackDetails) {
        let request = FinalizeRequest {
            source: job.output_temp_path.clone(),
            destination: job.output_final_path.clone(),
            details,
        };

        if let Err(e) = self.post.finalize(&request).await {
            tracing::warn!("Post-processing failed for {}: {}", job.source_url, e);
        }

        self.events.job_complete(&job.source_url, job.output_final_path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{FakeTool, RecordingPostProcessor};
    use crate::downloader::QueueEvent;

    fn runner(tool: Arc<FakeTool>, post: Arc<RecordingPostProcessor>, events: QueueEvents) -> JobRunner {
        runner_with(tool, post, events, |_| {})
    }

    fn runner_with(
        tool: Arc<FakeTool>,
        post: Arc<RecordingPostProcessor>,
        events: QueueEvents,
        configure: impl FnOnce(&mut Config),
    ) -> JobRunner {
        let mut config = Config::default();
        config.timeouts.probe_attempts = 1;
        configure(&mut config);
        JobRunner::new(tool, post, ScratchWorkspace::new(PathBuf::from("/scratch")), &config, events)
    }

    fn probe_json() -> String {
        r#"{"artist": "Artist", "title": "Song", "thumbnails": []}"#.to_string()
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn close_runs_post_processing_and_reports_completion() {
        let tool = Arc::new(FakeTool::with_script(vec![
            ProcessEvent::Progress(ProgressReading::Percent(42.5)),
            ProcessEvent::Close(Some(0)),
        ]));
        tool.push_probe(Ok(probe_json()));
        let post = Arc::new(RecordingPostProcessor::default());
        let (events, mut receiver) = QueueEvents::channel();

        let outcome = runner(tool.clone(), post.clone(), events)
            .run("https://www.youtube.com/watch?v=abc&list=PL1", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::Closed);
        assert_eq!(tool.spawned_urls(), vec!["https://www.youtube.com/watch?v=abc"]);

        let calls = post.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, PathBuf::from("/scratch/Artist - Song.mp3"));
        assert_eq!(calls[0].destination, PathBuf::from("/music/Artist - Song.mp3"));

        let published = drain(&mut receiver);
        assert_eq!(published[0], QueueEvent::Progress("Track Progress: 42.5".to_string()));
        assert!(matches!(&published[1], QueueEvent::JobComplete { output, .. } if output == Path::new("/music/Artist - Song.mp3")));
    }

    #[tokio::test]
    async fn not_a_number_after_full_progress_kills_and_finalizes() {
        let tool = Arc::new(FakeTool::with_script(vec![
            ProcessEvent::Progress(ProgressReading::Percent(50.0)),
            ProcessEvent::Progress(ProgressReading::Percent(100.0)),
            ProcessEvent::Progress(ProgressReading::NotANumber),
        ]));
        tool.push_probe(Ok(probe_json()));
        let post = Arc::new(RecordingPostProcessor::default());

        let outcome = runner(tool.clone(), post.clone(), QueueEvents::disabled())
            .run("https://www.youtube.com/watch?v=abc", DownloadFormat::OriginalContainer, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::Closed);
        assert!(tool.any_killed());
        assert_eq!(post.calls.lock().unwrap()[0].destination, PathBuf::from("/music/Artist - Song.webm"));
    }

    #[tokio::test]
    async fn not_a_number_mid_download_is_ignored() {
        let tool = Arc::new(FakeTool::with_script(vec![
            ProcessEvent::Progress(ProgressReading::Percent(10.0)),
            ProcessEvent::Progress(ProgressReading::NotANumber),
            ProcessEvent::Close(Some(0)),
        ]));
        let post = Arc::new(RecordingPostProcessor::default());

        let outcome = runner(tool.clone(), post.clone(), QueueEvents::disabled())
            .run("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::Closed);
        assert!(!tool.any_killed());
        assert!(post.calls.lock().unwrap()[0].destination.to_string_lossy().contains("audio_"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_process_times_out_and_is_killed() {
        let tool = Arc::new(FakeTool::with_script(vec![ProcessEvent::Progress(ProgressReading::Percent(3.0))]));
        let post = Arc::new(RecordingPostProcessor::default());

        let outcome = runner(tool.clone(), post.clone(), QueueEvents::disabled())
            .run("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::TimedOut);
        assert!(tool.any_killed());
        assert!(post.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn killed_process_is_finalized_only_after_it_exits() {
        let tool = Arc::new(FakeTool {
            ignore_kill: true,
            ..FakeTool::with_script(vec![
                ProcessEvent::Progress(ProgressReading::Percent(100.0)),
                ProcessEvent::Progress(ProgressReading::NotANumber),
            ])
        });
        let post = Arc::new(RecordingPostProcessor::default());

        let outcome = runner(tool.clone(), post.clone(), QueueEvents::disabled())
            .run("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::TimedOut);
        assert!(tool.any_killed());
        assert!(post.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_process_running_when_kill_is_disabled() {
        let tool = Arc::new(FakeTool::with_script(vec![ProcessEvent::Progress(ProgressReading::Percent(3.0))]));
        let post = Arc::new(RecordingPostProcessor::default());

        let outcome = runner_with(tool.clone(), post.clone(), QueueEvents::disabled(), |config| {
            config.timeouts.kill_on_timeout = false;
        })
        .run("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
        .await;

        assert_eq!(outcome, JobOutcome::TimedOut);
        assert!(!tool.any_killed());
        assert!(post.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_processing_failure_still_reports_completion() {
        let tool = Arc::new(FakeTool::with_script(vec![ProcessEvent::Close(Some(0))]));
        tool.push_probe(Ok(probe_json()));
        let post = Arc::new(RecordingPostProcessor { fail: true, ..RecordingPostProcessor::default() });
        let (events, mut receiver) = QueueEvents::channel();

        let outcome = runner(tool.clone(), post.clone(), events)
            .run("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::Closed);
        assert_eq!(post.calls.lock().unwrap().len(), 1);
        assert!(drain(&mut receiver).iter().any(|event| matches!(
            event,
            QueueEvent::JobComplete { output, .. } if output == Path::new("/music/Artist - Song.mp3")
        )));
    }

    #[tokio::test]
    async fn process_error_settles_without_post_processing() {
        let tool = Arc::new(FakeTool::with_script(vec![
            ProcessEvent::Error("spawn EACCES".to_string()),
            ProcessEvent::Close(Some(1)),
        ]));
        let post = Arc::new(RecordingPostProcessor::default());

        let outcome = runner(tool.clone(), post.clone(), QueueEvents::disabled())
            .run("https://www.youtube.com/watch?v=abc", DownloadFormat::AudioCompressed, "chrome", Path::new("/music"))
            .await;

        assert_eq!(outcome, JobOutcome::Errored);
        assert!(post.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn only_the_first_settlement_counts() {
        let mut job = DownloadJob {
            source_url: "u".to_string(),
            format: DownloadFormat::AudioCompressed,
            output_temp_path: PathBuf::from("/scratch/a.mp3"),
            output_final_path: PathBuf::from("/music/a.mp3"),
            progress_last: None,
            settled: None,
        };

        assert!(job.settle(JobOutcome::Closed));
        assert!(!job.settle(JobOutcome::TimedOut));
        assert_eq!(job.settled, Some(JobOutcome::Closed));
    }
}
