//! Custom error types for titlescout

use thiserror::Error;

/// Main error type for titlescout operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Portal error: {0}")]
    Portal(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Timed out waiting for {0}")]
    WaitTimeout(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Extraction error: {0}")]
    Extract(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for titlescout
pub type Result<T> = std::result::Result<T, Error>;
