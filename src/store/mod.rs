//! Durable config sources.

pub mod codec;
pub mod error;
pub mod file;
mod lock;
pub mod remote;

pub use codec::{CodecError, Format};
pub use error::StoreError;
pub use file::{FileStore, StagedWrite, DEFAULT_LOCK_TIMEOUT};
pub use remote::{RemoteSource, DEFAULT_REMOTE_PATH, DEFAULT_REMOTE_TIMEOUT};

use crate::config::Configuration;

/// Where the authoritative configuration lives.
#[derive(Debug, Clone)]
pub enum Source {
    File(FileStore),
    Remote(RemoteSource),
}

impl Source {
    /// Human-readable location for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Source::File(store) => store.path().display().to_string(),
            Source::Remote(remote) => remote.endpoint(),
        }
    }

    /// Seed the source with `default` if it is empty. Blocking.
    ///
    /// Remote sources have nothing to seed and always return `Ok(false)`.
    pub fn seed(&self, default: &Configuration) -> Result<bool, StoreError> {
        match self {
            Source::File(store) => store.ensure(default),
            Source::Remote(_) => Ok(false),
        }
    }

    /// Load the current configuration.
    ///
    /// File reads run on the blocking pool since they may wait on another
    /// process's lock.
    pub async fn fetch(&self) -> Result<Configuration, StoreError> {
        match self {
            Source::File(store) => {
                let store = store.clone();
                tokio::task::spawn_blocking(move || store.read()).await?
            }
            Source::Remote(remote) => remote.fetch().await,
        }
    }

    /// Apply `apply` to the stored configuration and persist the result.
    /// Blocking.
    ///
    /// File sources re-read the file under the exclusive lock before
    /// applying, see [`FileStore::modify`]. Remote sources are read-only.
    pub fn modify<F, E>(&self, apply: F) -> Result<Configuration, E>
    where
        F: FnOnce(&mut Configuration) -> Result<(), E>,
        E: From<StoreError>,
    {
        match self {
            Source::File(store) => store.modify(apply),
            Source::Remote(_) => Err(StoreError::ReadOnly.into()),
        }
    }
}
