//! Thread-safe in-memory configuration snapshot.
//!
//! The cache never performs I/O. Persistence is the caller's job; see
//! [`crate::configurator::Configurator`] for the path that keeps cache and
//! store in step.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::config::{ConfigDiff, Configuration, Value};

/// Shared config snapshot with interior mutability.
///
/// Allows multiple readers to access the snapshot concurrently while
/// writers get exclusive access. Every write bumps a generation counter,
/// which lets a slow refresh detect that it raced with a newer write.
#[derive(Clone, Default)]
pub struct ConfigCache {
    inner: Arc<RwLock<CacheInner>>,
}

#[derive(Default)]
struct CacheInner {
    config: Configuration,
    generation: u64,
}

impl ConfigCache {
    pub fn new(config: Configuration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                config,
                generation: 0,
            })),
        }
    }

    /// Get a clone of the current snapshot.
    pub fn get(&self) -> Configuration {
        self.inner.read().config.clone()
    }

    /// Whether `key` is present in the current snapshot.
    pub fn has(&self, key: &str) -> bool {
        self.inner.read().config.contains_key(key)
    }

    /// Clone of a single value.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.read().config.get(key).cloned()
    }

    /// Number of writes applied since creation.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Swap in a whole new snapshot, returning the previous one.
    pub fn replace(&self, config: Configuration) -> Configuration {
        let mut inner = self.inner.write();
        inner.generation += 1;
        std::mem::replace(&mut inner.config, config)
    }

    /// Swap in `config` only if no write happened since `expected` was read
    /// from [`generation`](Self::generation).
    ///
    /// Returns `None` when superseded. Otherwise returns the diff against the
    /// previous snapshot; an empty diff leaves the cache and its generation
    /// untouched.
    pub fn replace_if_current(&self, expected: u64, config: Configuration) -> Option<ConfigDiff> {
        let mut inner = self.inner.write();
        if inner.generation != expected {
            return None;
        }

        let diff = inner.config.diff(&config);
        if !diff.is_empty() {
            inner.config = config;
            inner.generation += 1;
        }
        Some(diff)
    }

    /// Take the write lock for a read-modify-write sequence.
    ///
    /// All other cache operations block until the guard is dropped.
    pub fn write(&self) -> CacheWriteGuard<'_> {
        CacheWriteGuard {
            inner: self.inner.write(),
        }
    }
}

/// Exclusive access to the cache for the duration of a mutation.
pub struct CacheWriteGuard<'a> {
    inner: RwLockWriteGuard<'a, CacheInner>,
}

impl CacheWriteGuard<'_> {
    /// Snapshot as of lock acquisition (or the last commit through this guard).
    pub fn snapshot(&self) -> &Configuration {
        &self.inner.config
    }

    /// Install `config` and bump the generation.
    pub fn commit(&mut self, config: Configuration) {
        self.inner.config = config;
        self.inner.generation += 1;
    }
}
