use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while resolving or writing a cached artifact.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache path not set: {0}")]
    Configuration(String),
    #[error("cache io failed at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("path segment exceeds 255 bytes: `{segment}`")]
    PathTooLong { segment: String },
    #[error("path segment `{segment}` is not allowed in a cache key")]
    InvalidSegment { segment: String },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("blocking cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures raised by an index store backend.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index persistence error: {0}")]
    Persistence(String),
}

impl IndexError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
