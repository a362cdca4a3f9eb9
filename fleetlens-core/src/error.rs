//! Error types for fleetlens-core
//!
//! Queries never surface these to callers: scanners degrade every source
//! failure to "no data for this fact". They exist so that internal helpers can
//! use `?` and so that configuration and logging setup can fail loudly.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the fleetlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid file discovery pattern
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging setup error
    #[error("logging error: {0}")]
    Logging(String),

    /// A source file or directory does not exist
    #[error("source unavailable: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    /// A source document exists but could not be decoded
    #[error("malformed record in {}: {message}", path.display())]
    MalformedRecord { path: PathBuf, message: String },
}

impl Error {
    /// Whether this error only means "the source is not there yet".
    ///
    /// Scanners log these at debug level; everything else is a warning.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::SourceUnavailable { .. } => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias for fleetlens-core
pub type Result<T> = std::result::Result<T, Error>;
