//! Error types for voxjuke-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Player commands do not use these: they report a `CommandStatus` instead, so
//! only lookups, queue indexing, transport and startup failures surface here.

use thiserror::Error;

/// Main error type for voxjuke-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors bubbled up from voxjuke-common
    #[error(transparent)]
    Common(#[from] voxjuke_common::Error),

    /// Media lookup returned nothing usable
    #[error("Not found: {0}")]
    NotFound(String),

    /// External helper process (yt-dlp, ffmpeg) failed
    #[error("Process error: {0}")]
    Process(String),

    /// Remote metadata API errors
    #[error("Metadata API error: {0}")]
    Api(String),

    /// Voice transport errors
    #[error("Voice error: {0}")]
    Voice(String),

    /// Queue index outside the current queue
    #[error("Index {index} out of range for queue of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// File / socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Api(err.to_string())
    }
}

/// Convenience Result type using voxjuke-player Error
pub type Result<T> = std::result::Result<T, Error>;
