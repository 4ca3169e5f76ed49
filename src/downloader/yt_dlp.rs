use crate::config::{DownloadFormat, ToolPaths};
use crate::downloader::{DownloadProcess, DownloadRequest, KillSwitch, MediaTool, ProcessEvent, ProgressReading};
use crate::errors::{Result, CoverQueueError};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc;

/// `[download]  45.2% of 3.45MiB at 1.20MiB/s ETA 00:02`
static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s*(.*?)\s+of\s+").expect("progress pattern is valid")
});

/// Format selector for probes: the smallest preview stream is enough
const PROBE_FORMAT: &str = "bestvideo[height<=144]";

/// Parse one stdout line into a progress reading
pub fn parse_progress_line(line: &str) -> Option<ProgressReading> {
    let captures = PROGRESS_LINE.captures(line.trim())?;
    let field = captures.get(1)?.as_str().trim().trim_end_matches('%').trim();

    match field.parse::<f64>() {
        Ok(percent) if percent.is_finite() => Some(ProgressReading::Percent(percent)),
        _ => Some(ProgressReading::NotANumber),
    }
}

/// yt-dlp subprocess wrapper
pub struct YtDlp {
    executable_path: PathBuf,
    converter_location: Option<PathBuf>,
}

impl YtDlp {
    /// Create a wrapper using configured binaries
    pub fn with_tools(tools: &ToolPaths) -> Self {
        Self {
            executable_path: tools.downloader.clone(),
            converter_location: tools.converter.clone(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn is_available(&self) -> bool {
        AsyncCommand::new(&self.executable_path)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn probe_args(url: &str, source_profile: &str) -> Vec<String> {
        vec![
            "--cookies-from-browser".to_string(), source_profile.to_string(),
            "-f".to_string(), PROBE_FORMAT.to_string(),
            "--skip-download".to_string(),
            "--print-json".to_string(),
            url.to_string(),
        ]
    }

    fn playlist_args(playlist_url: &str, source_profile: &str) -> Vec<String> {
        vec![
            "--cookies-from-browser".to_string(), source_profile.to_string(),
            "--flat-playlist".to_string(),
            "--get-id".to_string(),
            playlist_url.to_string(),
        ]
    }

    fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "--cookies-from-browser".to_string(), request.source_profile.clone(),
            request.url.clone(),
            "-f".to_string(), "bestaudio".to_string(),
            "-o".to_string(), request.output.to_string_lossy().into_owned(),
            "--newline".to_string(),
            "--no-playlist".to_string(),
        ];

        if request.format == DownloadFormat::AudioCompressed {
            args.extend(["-x".to_string(), "--audio-format".to_string(), "mp3".to_string()]);
            if let Some(converter) = &self.converter_location {
                args.push("--ffmpeg-location".to_string());
                args.push(converter.to_string_lossy().into_owned());
            }
        }

        args
    }

    async fn run_to_completion(&self, args: Vec<String>) -> std::result::Result<String, String> {
        let output = AsyncCommand::new(&self.executable_path)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("Failed to execute yt-dlp: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("yt-dlp failed ({}): {}", output.status, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaTool for YtDlp {
    async fn probe(&self, url: &str, source_profile: &str) -> Result<String> {
        self.run_to_completion(Self::probe_args(url, source_profile))
            .await
            .map_err(CoverQueueError::ProbeFailed)
    }

    async fn list_playlist(&self, playlist_url: &str, source_profile: &str) -> Result<Vec<String>> {
        let stdout = self
            .run_to_completion(Self::playlist_args(playlist_url, source_profile))
            .await
            .map_err(CoverQueueError::PlaylistListingFailed)?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn spawn_download(&self, request: &DownloadRequest) -> Result<DownloadProcess> {
        let mut child = AsyncCommand::new(&self.executable_path)
            .args(self.download_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoverQueueError::DownloadProcess(format!("Failed to spawn yt-dlp: {}", e)))?;

        let stdout = child.stdout.take()
            .ok_or_else(|| CoverQueueError::DownloadProcess("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child.stderr.take()
            .ok_or_else(|| CoverQueueError::DownloadProcess("yt-dlp stderr unavailable".to_string()))?;

        let (sender, events) = mpsc::unbounded_channel();
        let kill = KillSwitch::new();
        let kill_signal = kill.clone();

        tokio::spawn(async move {
            let mut out_reader = BufReader::new(stdout).lines();
            let mut err_reader = BufReader::new(stderr).lines();
            let mut stdout_done = false;
            let mut stderr_done = false;
            let mut kill_sent = false;

            loop {
                tokio::select! {
                    _ = kill_signal.requested(), if !kill_sent => {
                        kill_sent = true;
                        if let Err(e) = child.start_kill() {
                            tracing::warn!("Failed to kill yt-dlp process: {}", e);
                        }
                    }

                    res = out_reader.next_line(), if !stdout_done => {
                        match res {
                            Ok(Some(line)) => match parse_progress_line(&line) {
                                Some(reading) => { let _ = sender.send(ProcessEvent::Progress(reading)); }
                                None => tracing::debug!("yt-dlp: {}", line),
                            },
                            Ok(None) => stdout_done = true,
                            Err(e) => {
                                tracing::warn!("Error reading yt-dlp stdout: {}", e);
                                stdout_done = true;
                            }
                        }
                    }

                    res = err_reader.next_line(), if !stderr_done => {
                        match res {
                            Ok(Some(line)) => tracing::debug!("yt-dlp stderr: {}", line),
                            Ok(None) => stderr_done = true,
                            Err(e) => {
                                tracing::warn!("Error reading yt-dlp stderr: {}", e);
                                stderr_done = true;
                            }
                        }
                    }

                    res = child.wait() => {
                        let event = match res {
                            Ok(status) => ProcessEvent::Close(status.code()),
                            Err(e) => ProcessEvent::Error(format!("Failed to wait for yt-dlp: {}", e)),
                        };
                        let _ = sender.send(event);
                        break;
                    }
                }
            }
        });

        Ok(DownloadProcess { events, kill })
    }
}
