use thiserror::Error;

/// Main error type for the download queue
#[derive(Error, Debug)]
pub enum CoverQueueError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("ID3 tagging error: {0}")]
    Id3(#[from] id3::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No folder selected. Please select a download folder first.")]
    NoFolderConfigured,

    #[error("A drain is already in progress")]
    DrainInProgress,

    #[error("Metadata probe failed: {0}")]
    ProbeFailed(String),

    #[error("Artwork fetch failed: {0}")]
    ArtworkFetchFailed(String),

    #[error("Crop worker failed: {0}")]
    CropWorkerFailed(String),

    #[error("Tag write failed: {0}")]
    TagWriteFailed(String),

    #[error("Download process error: {0}")]
    DownloadProcess(String),

    #[error("Playlist listing failed: {0}")]
    PlaylistListingFailed(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV import error: {0}")]
    CsvImport(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, CoverQueueError>;
