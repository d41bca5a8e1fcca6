// src/error.rs
// Error types shared by the completion client, search client and session

use thiserror::Error;

/// Main error type for PackagingPal
#[derive(Error, Debug)]
pub enum PalError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("product search failed: {0}")]
    Search(String),

    #[error("invalid image: {0}")]
    Image(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Result using PalError
pub type Result<T> = std::result::Result<T, PalError>;

impl PalError {
    /// True when the failure came from bad user input rather than a remote service
    pub fn is_user_error(&self) -> bool {
        matches!(self, PalError::Image(_))
    }
}
