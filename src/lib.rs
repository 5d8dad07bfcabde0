//! Process-local configuration store.
//!
//! An in-memory key-value snapshot backed by a JSON file (or a read-only
//! HTTP endpoint), kept consistent under concurrent access and refreshed in
//! the background.
//!
//! ```no_run
//! use confstore::{Configuration, Configurator, InitOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let defaults: Configuration = [("version", "1.0")].into_iter().collect();
//! let store = Configurator::init(InitOptions::file("/tmp/cfg.json", defaults)).await?;
//!
//! store.add("env", "prod")?;
//! assert!(store.has("env"));
//!
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod configurator;
pub mod logging;
pub mod refresh;
pub mod shutdown;
pub mod store;

pub use cache::ConfigCache;
pub use config::{ConfigDiff, Configuration, Settings, Value};
pub use configurator::{
    Configurator, InitError, InitOptions, InitPolicy, LifecycleState, MutationError,
};
pub use refresh::{RefreshHandle, RefreshLoop, RefreshOutcome};
pub use shutdown::ShutdownHandle;
pub use store::{FileStore, Format, RemoteSource, Source, StoreError};
