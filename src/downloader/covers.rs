use crate::downloader::crop::{self, CropWorker};
use crate::downloader::metadata::TagWriter;
use crate::downloader::{FinalizeRequest, PostProcessor};
use crate::errors::{Result, CoverQueueError};
use crate::utils::net::NetworkUtils;
use crate::workspace::ScratchWorkspace;
use async_trait::async_trait;

/// Fetches the thumbnail, squares it and embeds it with the text tags
pub struct ArtworkPipeline {
    network: NetworkUtils,
    crop_worker: CropWorker,
    workspace: ScratchWorkspace,
}

impl ArtworkPipeline {
    pub fn new(network: NetworkUtils, crop_worker: CropWorker, workspace: ScratchWorkspace) -> Self {
        Self {
            network,
            crop_worker,
            workspace,
        }
    }

    /// Cover bytes to embed, or `None` when the thumbnail could not be fetched
    async fn prepare_cover(&self, thumbnail_url: &str) -> Option<Vec<u8>> {
        tracing::info!("Fetching album art...");
        let original = match self.network.fetch_image(thumbnail_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("{}; continuing without artwork", e);
                return None;
            }
        };

        let input = self.workspace.temp_file("cover", "img");
        let output = self.workspace.temp_file("cover_square", "jpg");

        if let Err(e) = tokio::fs::write(input.path(), &original).await {
            tracing::warn!("Could not stage artwork for cropping: {}; embedding uncropped image", e);
            return Self::uncropped(original).await;
        }

        match self.crop_worker.run(input.path(), output.path()).await {
            Ok(()) => match tokio::fs::read(output.path()).await {
                Ok(cropped) => Some(cropped),
                Err(e) => {
                    tracing::warn!("Cropped artwork unreadable: {}; embedding uncropped image", e);
                    Self::uncropped(original).await
                }
            },
            Err(e) => {
                tracing::warn!("{}; embedding uncropped image", e);
                Self::uncropped(original).await
            }
        }
    }

    /// The fetched image as JPEG, or `None` if it cannot be decoded
    async fn uncropped(original: Vec<u8>) -> Option<Vec<u8>> {
        match tokio::task::spawn_blocking(move || crop::ensure_jpeg(&original)).await {
            Ok(Ok(jpeg)) => Some(jpeg),
            Ok(Err(e)) => {
                tracing::warn!("Artwork is not a usable image: {}; continuing without artwork", e);
                None
            }
            Err(e) => {
                tracing::warn!("Artwork conversion task failed: {}; continuing without artwork", e);
                None
            }
        }
    }
}

#[async_trait]
impl PostProcessor for ArtworkPipeline {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<()> {
        let cover = match &request.details.thumbnail_url {
            Some(url) => self.prepare_cover(url).await,
            None => {
                tracing::info!("No thumbnail for {}, writing text tags only", request.destination.display());
                None
            }
        };

        let extension = request
            .source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_string();
        let staged = self.workspace.temp_file("tagged", &extension);
        tokio::fs::copy(&request.source, staged.path()).await?;

        let staged_path = staged.path().to_path_buf();
        let details = request.details.clone();
        let tagged = tokio::task::spawn_blocking(move || {
            TagWriter::write(&staged_path, &details, cover.as_deref())
        })
        .await
        .map_err(|e| CoverQueueError::TagWriteFailed(format!("tag task failed: {}", e)))??;

        if !tagged {
            tracing::info!("No tag writer for .{} files, copying as-is", extension);
        }

        staged.persist(&request.destination).await?;
        tracing::info!("Album art added and saved as {}", request.destination.display());
        Ok(())
    }
}
