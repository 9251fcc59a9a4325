//! Error types for the card pipeline.

use thiserror::Error;

/// Result type alias for card operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching data, rendering or delivering a card.
#[derive(Error, Debug)]
pub enum Error {
    /// A request could not be completed.
    #[error("Network error: {0}")]
    Network(String),

    /// The data source answered, but had nothing for the query.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The visual tree could not be rasterized.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// The share target refused or the user dismissed it.
    #[error("Share failed: {0}")]
    Share(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
