use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Metadata fetch failed or the tool output could not be parsed.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Search fallback exhausted every platform.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The download subprocess exited abnormally.
    #[error("Download error: {0}")]
    Download(String),

    /// The download subprocess succeeded but left no matching file behind.
    #[error("Downloaded file not found: {0}")]
    NotFoundAfterDownload(String),

    /// The chat transport rejected an attachment.
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<teloxide::RequestError> for AppError {
    fn from(error: teloxide::RequestError) -> Self {
        AppError::Transport(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
