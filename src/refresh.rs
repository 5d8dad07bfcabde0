//! Periodic reload of the cache from its source.
//!
//! Runs as a tokio task that re-reads the source on a fixed interval and
//! swaps the cache contents. Failed ticks keep the previous snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::ConfigCache;
use crate::config::ConfigDiff;
use crate::shutdown::ShutdownHandle;
use crate::store::{Source, StoreError};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a single refresh attempt.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The cache was swapped; the diff lists what changed.
    Replaced(ConfigDiff),
    /// The source matched the cache.
    Unchanged,
    /// A mutation landed while the source was being read; the read is stale
    /// and was discarded.
    Superseded,
    /// The source could not be read. The cache was left as it was.
    Failed(StoreError),
}

/// Reloads a [`ConfigCache`] from a [`Source`].
#[derive(Clone)]
pub struct RefreshLoop {
    source: Arc<Source>,
    cache: ConfigCache,
    interval: Duration,
}

impl RefreshLoop {
    pub fn new(source: Arc<Source>, cache: ConfigCache, interval: Duration) -> Self {
        Self {
            source,
            cache,
            interval,
        }
    }

    /// Perform one refresh now.
    pub async fn tick(&self) -> RefreshOutcome {
        let generation = self.cache.generation();

        let config = match self.source.fetch().await {
            Ok(config) => config,
            Err(e) => return RefreshOutcome::Failed(e),
        };

        match self.cache.replace_if_current(generation, config) {
            None => RefreshOutcome::Superseded,
            Some(diff) if diff.is_empty() => RefreshOutcome::Unchanged,
            Some(diff) => RefreshOutcome::Replaced(diff),
        }
    }

    /// Start the loop on the current tokio runtime.
    ///
    /// The first tick fires one full interval after spawning; the caller is
    /// expected to have loaded the cache already.
    pub fn spawn(&self, shutdown: ShutdownHandle) -> RefreshHandle {
        let refresher = self.clone();
        let task_shutdown = shutdown.clone();
        let task = tokio::spawn(async move { refresher.run(task_shutdown).await });
        RefreshHandle { shutdown, task }
    }

    async fn run(self, shutdown: ShutdownHandle) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; the initial load already happened.
        ticker.tick().await;

        let location = self.source.describe();
        tracing::info!(
            source = %location,
            interval_secs = self.interval.as_secs_f64(),
            "Refresh loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                outcome = self.tick() => log_outcome(&location, outcome),
            }
        }

        tracing::info!(source = %location, "Refresh loop stopped");
    }
}

fn log_outcome(location: &str, outcome: RefreshOutcome) {
    match outcome {
        RefreshOutcome::Replaced(diff) => tracing::info!(
            source = %location,
            added = ?diff.added,
            removed = ?diff.removed,
            changed = ?diff.changed,
            "Config refreshed"
        ),
        RefreshOutcome::Unchanged => {
            tracing::trace!(source = %location, "Config unchanged")
        }
        RefreshOutcome::Superseded => tracing::debug!(
            source = %location,
            "Refresh superseded by a concurrent write, skipping tick"
        ),
        RefreshOutcome::Failed(e) => tracing::warn!(
            source = %location,
            error = %e,
            "Config refresh failed, keeping previous snapshot"
        ),
    }
}

/// Handle to a running refresh loop.
pub struct RefreshHandle {
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.signal();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Refresh task ended abnormally");
        }
    }
}
