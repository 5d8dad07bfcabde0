use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::codec::CodecError;

/// Errors raised while reading or writing a config source.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config source '{path}' does not exist")]
    NotFound { path: PathBuf },

    #[error("Failed to parse config from '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited:?} waiting for lock on '{path}'")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Remote fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote '{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Remote config source is read-only")]
    ReadOnly,

    #[error("Background store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Lock contention or lock failure, as opposed to I/O or data problems.
    pub fn is_lock_error(&self) -> bool {
        matches!(self, Self::Lock { .. } | Self::LockTimeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
