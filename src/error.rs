//! Repograph error types.
//!
//! All errors are typed and provide root cause information.

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Repograph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error for path {path}: {source}")]
    Io {
        /// The file path that caused the I/O error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Tree-sitter parsing error.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// The file that failed to parse.
        file: PathBuf,
        /// The parse error message.
        message: String,
    },

    /// Graph store error outside of a group commit.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UTF-8 validation error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

impl Error {
    /// Stable identifier for the error variant, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io { .. } => "Io",
            Error::Parse { .. } => "Parse",
            Error::Store(_) => "Store",
            Error::Config { .. } => "Config",
            Error::Json(_) => "Json",
            Error::Utf8(_) => "Utf8",
            Error::Other(_) => "Other",
        }
    }

    /// File the error is about, if any.
    pub fn file_path(&self) -> Option<&std::path::Path> {
        match self {
            Error::Io { path, .. } => Some(path),
            Error::Parse { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// Result type alias for Repograph operations.
pub type Result<T> = std::result::Result<T, Error>;
