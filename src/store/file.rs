//! JSON file store with atomic replace and advisory locking.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::config::Configuration;
use crate::store::codec::{self, Format};
use crate::store::error::StoreError;
use crate::store::lock::{FileLock, LockMode};

/// Default upper bound on waiting for another process's lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// On-disk config file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so readers only ever see the old or the new contents. Every read and
/// write also takes an advisory lock on `<path>.lock` to cooperate with
/// other processes sharing the file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    format: Format,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self {
            path,
            lock_path,
            format: Format::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file the advisory lock is taken on.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Create the file with `default` if it does not exist yet.
    ///
    /// Returns `true` if the file was seeded. The existence check and the
    /// write happen under one exclusive lock, so concurrent callers in other
    /// processes cannot both seed.
    pub fn ensure(&self, default: &Configuration) -> Result<bool, StoreError> {
        let lock = self.lock(LockMode::Exclusive)?;
        if self.path.exists() {
            return Ok(false);
        }

        self.stage_locked(default, lock)?.commit()?;
        tracing::info!(
            path = %self.path.display(),
            keys = default.len(),
            "Seeded config file with defaults"
        );
        Ok(true)
    }

    /// Read and decode the file under a shared lock.
    pub fn read(&self) -> Result<Configuration, StoreError> {
        if !self.path.exists() {
            return Err(self.not_found());
        }

        let _lock = self.lock(LockMode::Shared)?;
        self.read_locked()
    }

    /// Read-modify-write under one exclusive lock.
    ///
    /// `apply` sees the file as it is on disk now, not any cached copy, so
    /// changes made by other writers since the last read are preserved. A
    /// missing file starts from an empty configuration. Nothing is written
    /// if `apply` fails. Returns the snapshot that was written.
    pub fn modify<F, E>(&self, apply: F) -> Result<Configuration, E>
    where
        F: FnOnce(&mut Configuration) -> Result<(), E>,
        E: From<StoreError>,
    {
        let lock = self.lock(LockMode::Exclusive)?;
        let mut config = match self.read_locked() {
            Ok(config) => config,
            Err(e) if e.is_not_found() => Configuration::new(),
            Err(e) => return Err(e.into()),
        };

        apply(&mut config)?;
        self.stage_locked(&config, lock)?.commit()?;
        Ok(config)
    }

    fn read_locked(&self) -> Result<Configuration, StoreError> {
        let bytes = fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                self.not_found()
            } else {
                StoreError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        codec::decode(self.format, &bytes).map_err(|source| StoreError::Parse {
            origin: self.path.display().to_string(),
            source,
        })
    }

    /// Atomically replace the file with `config`.
    pub fn write(&self, config: &Configuration) -> Result<(), StoreError> {
        self.stage(config)?.commit()
    }

    /// Write `config` to a temp file next to the target without replacing it.
    ///
    /// The exclusive lock is held until the returned [`StagedWrite`] is
    /// committed or dropped. Dropping it removes the temp file and leaves
    /// the target untouched.
    pub fn stage(&self, config: &Configuration) -> Result<StagedWrite, StoreError> {
        let lock = self.lock(LockMode::Exclusive)?;
        self.stage_locked(config, lock)
    }

    fn stage_locked(
        &self,
        config: &Configuration,
        lock: FileLock,
    ) -> Result<StagedWrite, StoreError> {
        let bytes = codec::encode(self.format, config).map_err(|source| StoreError::Parse {
            origin: self.path.display().to_string(),
            source,
        })?;

        let dir = self.parent_dir();
        let io_err = |source: std::io::Error| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".confstore-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(io_err)?;

        // Keep the permissions of the file being replaced.
        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(temp.path(), meta.permissions()).map_err(io_err)?;
        }

        temp.write_all(&bytes).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;

        Ok(StagedWrite {
            temp,
            target: self.path.clone(),
            _lock: lock,
        })
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn lock(&self, mode: LockMode) -> Result<FileLock, StoreError> {
        FileLock::acquire(&self.lock_path, mode, self.lock_timeout)
    }

    fn not_found(&self) -> StoreError {
        StoreError::NotFound {
            path: self.path.clone(),
        }
    }
}

/// A fully written temp file waiting to be renamed over its target.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
    _lock: FileLock,
}

impl StagedWrite {
    /// Path of the temp file holding the new contents.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename the temp file over the target.
    ///
    /// On failure the temp file is removed and the target is left as it was.
    pub fn commit(self) -> Result<(), StoreError> {
        let StagedWrite {
            temp,
            target,
            _lock,
        } = self;

        temp.persist(&target).map_err(|e| StoreError::Io {
            path: target.clone(),
            source: e.error,
        })?;

        sync_parent(&target);
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent(target: &Path) {
    let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::debug!(dir = %parent.display(), error = %e, "Directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_parent(_target: &Path) {}
