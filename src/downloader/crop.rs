use crate::errors::{Result, CoverQueueError};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;

/// JPEG quality for re-encoded covers
pub const COVER_JPEG_QUALITY: u8 = 95;

/// Hidden subcommand the worker process is started with
pub const CROP_WORKER_COMMAND: &str = "crop-worker";

/// Centred square inside a rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub size: u32,
}

impl CropRegion {
    /// `None` when the image is already square (or empty)
    pub fn for_dimensions(width: u32, height: u32) -> Option<Self> {
        if width == height || width == 0 || height == 0 {
            return None;
        }
        let size = width.min(height);
        Some(Self {
            left: (width - size) / 2,
            top: (height - size) / 2,
            size,
        })
    }
}

/// Crop encoded image bytes to a centred square JPEG; `None` if already square
pub fn crop_to_square(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let img = image::load_from_memory(data)?;
    let (width, height) = img.dimensions();

    let Some(region) = CropRegion::for_dimensions(width, height) else {
        return Ok(None);
    };

    let cropped = img.crop_imm(region.left, region.top, region.size, region.size);
    encode_jpeg(&cropped).map(Some)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, COVER_JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    Ok(output)
}

/// JPEG bytes for an image; JPEG input is returned unchanged
pub fn ensure_jpeg(data: &[u8]) -> Result<Vec<u8>> {
    if matches!(image::guess_format(data), Ok(ImageFormat::Jpeg)) {
        return Ok(data.to_vec());
    }
    let img = image::load_from_memory(data)?;
    encode_jpeg(&img)
}

/// Body of the worker process: square JPEGs are written through unchanged
pub fn crop_file(input: &Path, output: &Path) -> Result<()> {
    let data = std::fs::read(input)?;

    let cover = match crop_to_square(&data)? {
        Some(cropped) => cropped,
        None => ensure_jpeg(&data)?,
    };
    std::fs::write(output, cover)?;

    Ok(())
}

/// Runs cropping in a child process so a decoder crash stays contained
#[derive(Debug, Clone)]
pub struct CropWorker {
    executable: PathBuf,
}

impl CropWorker {
    pub fn new(executable: PathBuf) -> Self {
        Self { executable }
    }

    /// Worker backed by the running binary
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub async fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let result = AsyncCommand::new(&self.executable)
            .arg(CROP_WORKER_COMMAND)
            .arg(input)
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoverQueueError::CropWorkerFailed(format!("could not start worker: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CoverQueueError::CropWorkerFailed(format!(
                "worker exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
