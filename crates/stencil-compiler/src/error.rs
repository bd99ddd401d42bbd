//! Cache error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or writing compiled units.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file or directory could not be read or written.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A compiled unit could not be encoded or decoded.
    #[error("cache entry {path} could not be (de)serialized: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
