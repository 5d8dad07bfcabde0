//! Key-level config API over a cache and its durable source.
//!
//! A [`Configurator`] owns one [`ConfigCache`], the [`Source`] it mirrors and
//! the background [`RefreshLoop`]. Reads are served from the cache only.
//! Mutations are read-modify-write against the source itself: the file is
//! re-read under its exclusive lock, the change is applied to those contents
//! and written back, and only then is the result installed in the cache.
//! Writers sharing a file therefore never drop each other's changes, and a
//! failed persist leaves both sides unchanged.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ConfigCache;
use crate::config::{ConfigDiff, Configuration, Value};
use crate::refresh::{RefreshHandle, RefreshLoop, RefreshOutcome, DEFAULT_REFRESH_INTERVAL};
use crate::shutdown::ShutdownHandle;
use crate::store::{FileStore, RemoteSource, Source, StoreError};

/// Errors returned by key-level mutations.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Key '{key}' already exists")]
    KeyExists { key: String },

    #[error("Key '{key}' not found")]
    KeyNotFound { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that abort initialization.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Failed to seed config at '{location}': {source}")]
    Seed {
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to load config from '{location}': {source}")]
    Load {
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("Refresh interval must be greater than zero")]
    InvalidInterval,

    #[error("No tokio runtime available to run the refresh loop")]
    Runtime,
}

/// What to do when the first load after seeding fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPolicy {
    /// Fail initialization.
    #[default]
    Strict,
    /// Serve the default configuration until a refresh succeeds.
    FallbackToDefault,
}

/// Lifecycle of a [`Configurator`].
///
/// `init` passes through `Unconfigured`, `Seeding` and `Loaded` before it
/// returns; those transitions are traced at debug level. A constructed
/// handle therefore reports only `Refreshing` or, after
/// [`Configurator::shutdown`], `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Unconfigured = 0,
    Seeding = 1,
    Loaded = 2,
    Refreshing = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unconfigured,
            1 => Self::Seeding,
            2 => Self::Loaded,
            3 => Self::Refreshing,
            _ => Self::Stopped,
        }
    }
}

/// Parameters for [`Configurator::init`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub source: Source,
    pub defaults: Configuration,
    pub interval: Duration,
    pub policy: InitPolicy,
}

impl InitOptions {
    pub fn new(source: Source, defaults: Configuration) -> Self {
        Self {
            source,
            defaults,
            interval: DEFAULT_REFRESH_INTERVAL,
            policy: InitPolicy::default(),
        }
    }

    /// Flat JSON file at `path` with default locking.
    pub fn file(path: impl Into<PathBuf>, defaults: Configuration) -> Self {
        Self::new(Source::File(FileStore::new(path)), defaults)
    }

    /// Read-only remote source. Falls back to `defaults` when unreachable.
    pub fn remote(remote: RemoteSource, defaults: Configuration) -> Self {
        Self::new(Source::Remote(remote), defaults).with_policy(InitPolicy::FallbackToDefault)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: InitPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Handle to one config store.
///
/// Independent instances may coexist in a process. Dropping the handle stops
/// its refresh loop; [`shutdown`](Self::shutdown) also waits for it.
pub struct Configurator {
    source: Arc<Source>,
    cache: ConfigCache,
    refresher: RefreshLoop,
    refresh: Mutex<Option<RefreshHandle>>,
    shutdown: ShutdownHandle,
    state: AtomicU8,
}

impl Configurator {
    /// Seed the source if absent, load it and start the refresh loop.
    ///
    /// # Errors
    /// - [`InitError::Seed`] if the file could not be created.
    /// - [`InitError::Load`] if the first load failed under
    ///   [`InitPolicy::Strict`]. No refresh loop is started in that case.
    pub async fn init(options: InitOptions) -> Result<Self, InitError> {
        let InitOptions {
            source,
            defaults,
            interval,
            policy,
        } = options;

        if interval.is_zero() {
            return Err(InitError::InvalidInterval);
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(InitError::Runtime);
        }

        let source = Arc::new(source);
        let location = source.describe();
        trace_transition(&location, LifecycleState::Unconfigured);

        trace_transition(&location, LifecycleState::Seeding);
        let seed_source = Arc::clone(&source);
        let seed_defaults = defaults.clone();
        let seeded = tokio::task::spawn_blocking(move || seed_source.seed(&seed_defaults))
            .await
            .map_err(StoreError::from)
            .and_then(|result| result)
            .map_err(|source| InitError::Seed {
                location: location.clone(),
                source,
            })?;

        let initial = match source.fetch().await {
            Ok(config) => config,
            Err(e) => match policy {
                InitPolicy::Strict => {
                    return Err(InitError::Load {
                        location,
                        source: e,
                    })
                }
                InitPolicy::FallbackToDefault => {
                    tracing::warn!(
                        source = %location,
                        error = %e,
                        "Initial config load failed, serving defaults"
                    );
                    defaults
                }
            },
        };
        trace_transition(&location, LifecycleState::Loaded);
        tracing::info!(
            source = %location,
            seeded,
            keys = initial.len(),
            "Config loaded"
        );

        let cache = ConfigCache::new(initial);
        let refresher = RefreshLoop::new(Arc::clone(&source), cache.clone(), interval);
        let shutdown = ShutdownHandle::new();
        let handle = refresher.spawn(shutdown.clone());
        trace_transition(&location, LifecycleState::Refreshing);

        Ok(Self {
            source,
            cache,
            refresher,
            refresh: Mutex::new(Some(handle)),
            shutdown,
            state: AtomicU8::new(LifecycleState::Refreshing as u8),
        })
    }

    /// `Refreshing` until [`shutdown`](Self::shutdown), then `Stopped`.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Current snapshot. Never blocks on I/O.
    pub fn get(&self) -> Configuration {
        self.cache.get()
    }

    pub fn has(&self, key: &str) -> bool {
        self.cache.has(key)
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.cache.value(key)
    }

    /// Insert a new key.
    ///
    /// # Errors
    /// [`MutationError::KeyExists`] if `key` is already present, or
    /// [`MutationError::Store`] if the write failed.
    pub fn add(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), MutationError> {
        let key = key.into();
        self.mutate("add", &key, |config| {
            if config.contains_key(&key) {
                return Err(MutationError::KeyExists { key: key.clone() });
            }
            config.insert(key.clone(), value);
            Ok(())
        })
    }

    /// Overwrite an existing key.
    ///
    /// # Errors
    /// [`MutationError::KeyNotFound`] if `key` is absent, or
    /// [`MutationError::Store`] if the write failed.
    pub fn update(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), MutationError> {
        let key = key.into();
        self.mutate("update", &key, |config| {
            if !config.contains_key(&key) {
                return Err(MutationError::KeyNotFound { key: key.clone() });
            }
            config.insert(key.clone(), value);
            Ok(())
        })
    }

    /// Remove an existing key.
    ///
    /// # Errors
    /// [`MutationError::KeyNotFound`] if `key` is absent, or
    /// [`MutationError::Store`] if the write failed.
    pub fn delete(&self, key: &str) -> Result<(), MutationError> {
        self.mutate("delete", key, |config| {
            config
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| MutationError::KeyNotFound {
                    key: key.to_string(),
                })
        })
    }

    /// Persist `config` as the whole new snapshot, then install it.
    ///
    /// Unlike the key-level mutations this discards whatever else is on
    /// disk. The returned diff is against this handle's previous snapshot.
    pub fn replace(&self, config: Configuration) -> Result<ConfigDiff, MutationError> {
        let mut guard = self.cache.write();
        let diff = guard.snapshot().diff(&config);
        let written = self.source.modify(|current| {
            *current = config;
            Ok::<_, MutationError>(())
        })?;
        guard.commit(written);
        tracing::debug!(changed = diff.len(), "Config replaced");
        Ok(diff)
    }

    /// Re-read the source now.
    ///
    /// Unlike the background loop this surfaces read errors. A read that
    /// raced with a concurrent mutation is discarded and reported as no change.
    pub async fn reload(&self) -> Result<ConfigDiff, StoreError> {
        match self.refresher.tick().await {
            RefreshOutcome::Replaced(diff) => Ok(diff),
            RefreshOutcome::Unchanged => Ok(ConfigDiff::default()),
            RefreshOutcome::Superseded => {
                tracing::debug!("Reload superseded by a concurrent write");
                Ok(ConfigDiff::default())
            }
            RefreshOutcome::Failed(e) => Err(e),
        }
    }

    /// Stop the refresh loop and wait for it to exit. Idempotent.
    pub async fn shutdown(&self) {
        let handle = self.refresh.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        self.state
            .store(LifecycleState::Stopped as u8, Ordering::SeqCst);
    }

    /// Apply `apply` to the source's current contents under the cache write
    /// lock, then install what was written. The installed snapshot also
    /// carries any changes other writers made to the file.
    fn mutate<F>(&self, op: &'static str, key: &str, apply: F) -> Result<(), MutationError>
    where
        F: FnOnce(&mut Configuration) -> Result<(), MutationError>,
    {
        let mut guard = self.cache.write();
        match self.source.modify(apply) {
            Ok(written) => {
                guard.commit(written);
                tracing::debug!(op, key, "Config mutation applied");
                Ok(())
            }
            Err(MutationError::Store(e)) => {
                tracing::warn!(op, key, error = %e, "Config persist failed, cache unchanged");
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }
}

fn trace_transition(location: &str, state: LifecycleState) {
    tracing::debug!(source = %location, state = ?state, "Config lifecycle transition");
}

impl Drop for Configurator {
    fn drop(&mut self) {
        self.shutdown.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn defaults() -> Configuration {
        [("version", json!("1.0"))].into_iter().collect()
    }

    #[tokio::test]
    async fn test_init_seeds_and_reaches_refreshing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");

        let store = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .unwrap();

        assert_eq!(store.state(), LifecycleState::Refreshing);
        assert_eq!(store.get(), defaults());
        assert!(path.exists());

        store.shutdown().await;
        assert_eq!(store.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_init_strict_fails_on_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "not json").unwrap();

        let err = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InitError::Load { .. }));
    }

    #[tokio::test]
    async fn test_init_fallback_serves_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "not json").unwrap();

        let options =
            InitOptions::file(&path, defaults()).with_policy(InitPolicy::FallbackToDefault);
        let store = Configurator::init(options).await.unwrap();
        assert_eq!(store.get(), defaults());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_init_missing_parent_is_seed_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent").join("cfg.json");

        let err = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InitError::Seed { .. }));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let options = InitOptions::file(dir.path().join("cfg.json"), defaults())
            .with_interval(Duration::ZERO);

        let err = Configurator::init(options).await.err().unwrap();
        assert!(matches!(err, InitError::InvalidInterval));
    }

    #[tokio::test]
    async fn test_mutation_errors_are_distinct() {
        let dir = TempDir::new().unwrap();
        let store = Configurator::init(InitOptions::file(dir.path().join("cfg.json"), defaults()))
            .await
            .unwrap();

        assert!(matches!(
            store.add("version", "2.0"),
            Err(MutationError::KeyExists { .. })
        ));
        assert!(matches!(
            store.update("env", "prod"),
            Err(MutationError::KeyNotFound { .. })
        ));
        assert!(matches!(
            store.delete("env"),
            Err(MutationError::KeyNotFound { .. })
        ));
        assert_eq!(store.get(), defaults());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_cache_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        let store = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .unwrap();

        // Replace the store's directory entry with a directory so the rename fails.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let err = store.add("env", "prod").unwrap_err();
        assert!(matches!(err, MutationError::Store(StoreError::Io { .. })));
        assert!(!store.has("env"));
        assert_eq!(store.get(), defaults());

        // No temp files left behind next to the target.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_mutation_sees_changes_from_another_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        let store = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .unwrap();

        // Someone else edits the file before the next refresh.
        fs::write(&path, r#"{"version": "1.0", "env": "prod"}"#).unwrap();

        assert!(matches!(
            store.add("env", "dev"),
            Err(MutationError::KeyExists { .. })
        ));
        store.add("port", 80).unwrap();

        let on_disk = FileStore::new(&path).read().unwrap();
        assert_eq!(on_disk.get("env"), Some(&json!("prod")));
        assert_eq!(on_disk.get("port"), Some(&json!(80)));
        assert_eq!(store.get(), on_disk);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_replace_persists_whole_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        let store = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .unwrap();

        let next: Configuration = [("env", "prod")].into_iter().collect();
        let diff = store.replace(next.clone()).unwrap();
        assert_eq!(diff.added, vec!["env"]);
        assert_eq!(diff.removed, vec!["version"]);
        assert_eq!(store.get(), next);
        assert_eq!(FileStore::new(&path).read().unwrap(), next);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_surfaces_errors_and_keeps_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        let store = Configurator::init(InitOptions::file(&path, defaults()))
            .await
            .unwrap();

        fs::write(&path, r#"{"version": "1.1"}"#).unwrap();
        let diff = store.reload().await.unwrap();
        assert_eq!(diff.changed, vec!["version"]);
        assert_eq!(store.value("version"), Some(json!("1.1")));

        fs::write(&path, "garbage").unwrap();
        assert!(store.reload().await.is_err());
        assert_eq!(store.value("version"), Some(json!("1.1")));
        store.shutdown().await;
    }
}
