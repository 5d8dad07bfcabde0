//! Cross-process advisory locking on a sidecar lock file.
//!
//! The data file is replaced by rename on every write, so the lock lives on
//! `<path>.lock`, whose inode never changes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::store::error::StoreError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(2);
const MAX_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// Held advisory lock. Released on drop.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire `mode` on `path`, creating the lock file if needed.
    ///
    /// Contention is retried with exponential backoff until `timeout`
    /// elapses.
    pub(crate) fn acquire(
        path: &Path,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let contended = fs2::lock_contended_error().kind();
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            // Fully qualified: std::fs::File has inherent lock methods of the same name.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match attempt {
                Ok(()) => {
                    tracing::debug!(
                        path = %path.display(),
                        ?mode,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Advisory lock acquired"
                    );
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == contended => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(StoreError::LockTimeout {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    thread::sleep(backoff.min(timeout - waited));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(source) => {
                    return Err(StoreError::Lock {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release advisory lock");
        }
    }
}
