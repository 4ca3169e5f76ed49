use crate::errors::{Result, CoverQueueError};
use reqwest::Client;
use std::time::Duration;

/// Network utilities
#[derive(Clone)]
pub struct NetworkUtils {
    client: Client,
}

impl NetworkUtils {
    /// Create a new network utils instance
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new network utils instance with custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("cover-queue/0.1")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Fetch an image; any non-success status is an artwork fetch failure
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await
            .map_err(|e| CoverQueueError::ArtworkFetchFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CoverQueueError::ArtworkFetchFailed(
                format!("{} returned {}", url, response.status())
            ));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

impl Default for NetworkUtils {
    fn default() -> Self {
        Self::new()
    }
}
