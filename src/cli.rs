use clap::{Parser, Subcommand};
use crate::config::DownloadFormat;
use crate::csv_import::{CsvImporter, QueueRequest};
use crate::downloader::covers::ArtworkPipeline;
use crate::downloader::crop::{self, CropWorker};
use crate::downloader::queue::DrainSummary;
use crate::downloader::yt_dlp::YtDlp;
use crate::downloader::{recrop, QueueEvent, QueueEvents, QueueProcessor};
use crate::errors::{Result, CoverQueueError};
use crate::settings::Settings;
use crate::utils::net::NetworkUtils;
use crate::workspace::ScratchWorkspace;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// cover-queue - Queue audio downloads and embed square cover art
#[derive(Parser)]
#[command(name = "cover-queue")]
#[command(about = "Download audio through yt-dlp with squared cover art and tags")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue one or more URLs (items or playlists) and download them in order
    Download {
        /// Item or playlist URLs
        urls: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<DownloadFormat>,

        /// Browser profile used for source-site cookies
        #[arg(short, long)]
        profile: Option<String>,

        /// Set and remember the destination folder
        #[arg(long)]
        folder: Option<PathBuf>,

        /// CSV file with url,format,profile columns
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Configure application settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Square up embedded covers of every mp3 in a folder
    Recrop {
        /// Folder containing mp3 files
        folder: PathBuf,
    },

    /// Crop an image file to a centred square (internal)
    #[command(hide = true)]
    CropWorker {
        input: PathBuf,
        output: PathBuf,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set destination folder
    SetFolder {
        /// Directory path
        path: PathBuf,
    },

    /// Forget the destination folder
    ClearFolder,

    /// Reset to default settings
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Cli as clap::Parser>::parse()
    }

    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Download { urls, format, profile, folder, input } => {
                handle_download(urls, format, profile, folder, input).await
            }
            Commands::Config { command } => handle_config(command),
            Commands::Recrop { folder } => handle_recrop(folder).await,
            Commands::CropWorker { input, output } => crop::crop_file(&input, &output),
        }
    }
}

async fn handle_download(
    urls: Vec<String>,
    format: Option<DownloadFormat>,
    profile: Option<String>,
    folder: Option<PathBuf>,
    input: Option<PathBuf>,
) -> Result<()> {
    let mut settings = Settings::load()?;
    if let Some(folder) = folder {
        settings.set_download_folder(folder)?;
    }

    let config = settings.config().clone();
    let format = format.unwrap_or(config.default_format);
    let profile = profile.unwrap_or_else(|| config.source_profile.clone());

    let mut requests: Vec<QueueRequest> = urls
        .into_iter()
        .map(|url| QueueRequest { url, format, source_profile: profile.clone() })
        .collect();
    if let Some(csv_path) = input {
        requests.extend(CsvImporter::new(format, profile.clone()).import_from_csv(&csv_path)?);
    }
    if requests.is_empty() {
        return Err(CoverQueueError::InvalidUrl("no URLs given; pass URLs or --input <csv>".to_string()));
    }

    let tool = YtDlp::with_tools(&config.tools);
    if !tool.is_available().await {
        tracing::warn!("{} did not answer --version; downloads will likely fail", config.tools.downloader.display());
    }

    let crop_worker = match &config.tools.crop_worker {
        Some(path) => CropWorker::new(path.clone()),
        None => CropWorker::current_exe()?,
    };
    let pipeline = ArtworkPipeline::new(
        NetworkUtils::new(),
        crop_worker,
        ScratchWorkspace::new(config.scratch_dir()),
    );

    let (events, receiver) = QueueEvents::channel();
    let renderer = tokio::spawn(render_events(receiver));

    let queue = QueueProcessor::new(
        Arc::new(tool),
        Arc::new(pipeline),
        Arc::new(RwLock::new(settings)),
        events,
    );
    for request in &requests {
        queue.submit(&request.url, request.format, &request.source_profile);
    }

    let result = queue.drain().await;
    drop(queue);
    if let Err(e) = renderer.await {
        tracing::warn!("Event renderer stopped: {}", e);
    }

    let DrainSummary { consumed, failed } = result?;
    println!("Done: {} consumed, {} failed", consumed, failed);
    Ok(())
}

/// Print queue events until every publisher is gone
async fn render_events(mut receiver: mpsc::UnboundedReceiver<QueueEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            QueueEvent::Snapshot(entries) => {
                println!("Queue:");
                for entry in entries {
                    println!(
                        "  #{} [{}] {:>6.2}% {} ({}, {})",
                        entry.id, entry.status, entry.percentage, entry.url, entry.format, entry.source_profile
                    );
                }
            }
            QueueEvent::Progress(message) => println!("{}", message),
            QueueEvent::JobComplete { url, output } => {
                println!("Download complete: {} -> {}", url, output.display());
            }
            QueueEvent::QueueFinished => println!("Finished downloads"),
            QueueEvent::Error(message) => eprintln!("Error: {}", message),
        }
    }
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    let mut settings = Settings::load()?;

    match command {
        ConfigCommands::Show => {
            let config = settings.config();
            println!("Current configuration ({}):", settings.path().display());
            match &config.download_folder {
                Some(folder) => println!("  Download folder: {}", folder.display()),
                None => println!("  Download folder: not set"),
            }
            println!("  Default format: {}", config.default_format);
            println!("  Source profile: {}", config.source_profile);
            println!("  Thumbnail marker: {}", config.thumbnail_marker);
            println!("  Scratch directory: {}", config.scratch_dir().display());
            println!("  Downloader: {}", config.tools.downloader.display());
            if let Some(converter) = &config.tools.converter {
                println!("  Converter: {}", converter.display());
            }
            println!(
                "  Timeouts: probe {}s x{}, job {}s, playlist listing {}s, item delay {}s, kill on timeout {}",
                config.timeouts.probe_secs,
                config.timeouts.probe_attempts,
                config.timeouts.job_secs,
                config.timeouts.playlist_listing_secs,
                config.timeouts.item_delay_secs,
                config.timeouts.kill_on_timeout
            );
        }
        ConfigCommands::SetFolder { path } => {
            settings.set_download_folder(path.clone())?;
            println!("Download folder updated to: {}", path.display());
        }
        ConfigCommands::ClearFolder => {
            settings.clear_download_folder()?;
            println!("Download folder cleared");
        }
        ConfigCommands::Reset => {
            settings.reset()?;
            println!("Configuration reset to defaults");
        }
    }

    Ok(())
}

async fn handle_recrop(folder: PathBuf) -> Result<()> {
    println!("Recropping covers in: {}", folder.display());

    let summary = tokio::task::spawn_blocking(move || recrop::recrop_folder(&folder))
        .await
        .map_err(|e| CoverQueueError::CropWorkerFailed(format!("recrop task failed: {}", e)))??;

    println!(
        "Cropped {}, already square {}, without art {}, failed {}",
        summary.cropped,
        summary.already_square,
        summary.no_artwork,
        summary.failed.len()
    );
    for path in &summary.failed {
        println!("  failed: {}", path.display());
    }
    Ok(())
}
