use crate::downloader::crop::crop_to_square;
use crate::downloader::metadata::TagWriter;
use crate::errors::Result;
use std::path::{Path, PathBuf};

/// What happened to one file during a recrop pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecropOutcome {
    Cropped,
    AlreadySquare,
    NoArtwork,
}

/// Totals for a recrop pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecropSummary {
    pub cropped: usize,
    pub already_square: usize,
    pub no_artwork: usize,
    pub failed: Vec<PathBuf>,
}

impl RecropSummary {
    fn record(&mut self, outcome: RecropOutcome) {
        match outcome {
            RecropOutcome::Cropped => self.cropped += 1,
            RecropOutcome::AlreadySquare => self.already_square += 1,
            RecropOutcome::NoArtwork => self.no_artwork += 1,
        }
    }
}

/// Square up the embedded covers of every mp3 directly inside `folder`
pub fn recrop_folder(folder: &Path) -> Result<RecropSummary> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("mp3"))
        })
        .collect();
    files.sort();

    let mut summary = RecropSummary::default();
    for path in files {
        tracing::info!("Processing: {}", path.display());
        match recrop_file(&path) {
            Ok(outcome) => {
                match outcome {
                    RecropOutcome::Cropped => tracing::info!("  Cover cropped and updated"),
                    RecropOutcome::AlreadySquare => tracing::info!("  Cover already square, skipping"),
                    RecropOutcome::NoArtwork => tracing::info!("  No cover art found, skipping"),
                }
                summary.record(outcome);
            }
            Err(e) => {
                tracing::warn!("  Error processing {}: {}", path.display(), e);
                summary.failed.push(path);
            }
        }
    }

    Ok(summary)
}

pub fn recrop_file(path: &Path) -> Result<RecropOutcome> {
    let Some(cover) = TagWriter::read_mp3_picture(path)? else {
        return Ok(RecropOutcome::NoArtwork);
    };

    match crop_to_square(&cover)? {
        Some(cropped) => {
            TagWriter::replace_mp3_cover(path, cropped)?;
            Ok(RecropOutcome::Cropped)
        }
        None => Ok(RecropOutcome::AlreadySquare),
    }
}
