//! Error types for filecache
//!
//! This module defines the common error types used throughout the system.
//! A cache miss is never an error; operations that can miss return
//! `Ok(None)` and reserve `Err` for unmet preconditions and unrecoverable
//! I/O.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for filecache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for filecache
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetch of {origin} failed: {reason}")]
    Fetch { origin: String, reason: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("unknown codec tag: {0}")]
    UnknownCodec(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a write error for the given path
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Create a fetch error for the given source
    pub fn fetch(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a fatal construction-time error
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
