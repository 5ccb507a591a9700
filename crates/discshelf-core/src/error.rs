//! Error types for the discshelf core library

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for discshelf operations
#[derive(Error, Debug)]
pub enum Error {
    /// Source image or track file not found or inaccessible
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// IO error during read/write operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A source image could not be turned into a title
    #[error("Failed to add {path}: {reason}")]
    Discovery {
        /// Image that was being discovered
        path: PathBuf,
        /// Why discovery failed
        reason: String,
    },

    /// chdman reported an error or exited with a non-zero status while converting
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// chdman wrote to stderr while reading archive info, or the output was not understood
    #[error("Archive inspection failed: {0}")]
    Inspection(String),

    /// The external compressor could not be started
    #[error("chdman not found or not executable: {0}")]
    ToolNotFound(PathBuf),

    /// The manifest template could not be read
    #[error("Failed to read template {path}: {source}")]
    Template {
        /// Template path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Malformed cue sheet or manifest content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error stops the whole batch rather than a single title
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Error::Conversion(_) | Error::Inspection(_) | Error::ToolNotFound(_)
        )
    }
}

/// Result type alias using the discshelf error type
pub type Result<T> = std::result::Result<T, Error>;
