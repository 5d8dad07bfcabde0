//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_remote;

use confstore::{Configuration, Configurator, FileStore, InitOptions};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Defaults used by most scenarios: `{"version": "1.0"}`.
pub fn version_defaults() -> Configuration {
    [("version", json!("1.0"))].into_iter().collect()
}

/// Temp directory plus a not-yet-existing config path inside it.
pub fn temp_config_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("cfg.json");
    (temp_dir, config_path)
}

/// Initialize a file-backed store with a short refresh interval.
pub async fn init_file_store(
    path: &PathBuf,
    defaults: Configuration,
    interval: Duration,
) -> Configurator {
    Configurator::init(InitOptions::file(path, defaults).with_interval(interval))
        .await
        .expect("Failed to init store")
}

/// Read the file through a fresh store instance, bypassing any cache.
pub fn read_disk(path: &PathBuf) -> Configuration {
    FileStore::new(path).read().expect("Failed to read config file")
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
