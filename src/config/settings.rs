use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::credentials::CredentialSource;
use crate::config::types::Configuration;
use crate::configurator::{InitOptions, InitPolicy};
use crate::store::{
    FileStore, Format, RemoteSource, Source, StoreError, DEFAULT_REMOTE_PATH,
};

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Settings validation failed: {message}")]
    ValidationError { message: String },

    #[error("Failed to build remote source: {0}")]
    RemoteError(#[from] StoreError),
}

/// Root settings container for the `confstore` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    /// When present, the remote endpoint replaces the file as the source.
    #[serde(default)]
    pub remote: Option<RemoteSettings>,
    /// Default configuration used to seed the file and as fallback.
    #[serde(default)]
    pub defaults: toml::Table,
}

/// Config file location and on-disk shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub format: Format,
    /// Max wait for another process's lock, in milliseconds (default: 5000).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Background refresh behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Seconds between reloads (default: 60).
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub policy: InitPolicy,
}

/// Remote endpoint settings. Host and token come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_host_env")]
    pub host_env: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_remote_path")]
    pub path: String,
    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,
}

fn default_store_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir.join("confstore").join("config.json")
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_host_env() -> String {
    "CORE_HOST".to_string()
}

fn default_token_env() -> String {
    "CORE_TOKEN".to_string()
}

fn default_remote_path() -> String {
    DEFAULT_REMOTE_PATH.to_string()
}

fn default_remote_timeout() -> u64 {
    10
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            format: Format::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            policy: InitPolicy::default(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host_env: default_host_env(),
            token_env: default_token_env(),
            path: default_remote_path(),
            timeout_seconds: default_remote_timeout(),
        }
    }
}

impl Settings {
    /// Returns the path to the settings file.
    ///
    /// Uses `~/.config/confstore/settings.toml` on Unix/macOS,
    /// or equivalent on other platforms via `dirs::config_dir()`.
    /// Falls back to current directory if config_dir is unavailable.
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("confstore").join("settings.toml")
    }

    /// Loads settings from the default settings file.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&Self::settings_path())
    }

    /// Loads settings from `path`.
    ///
    /// - If the file doesn't exist, returns `Settings::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// Checks that the refresh interval and all timeouts are non-zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.refresh.interval_seconds == 0 {
            return Err(validation("refresh.interval_seconds must be greater than zero"));
        }
        if self.store.lock_timeout_ms == 0 {
            return Err(validation("store.lock_timeout_ms must be greater than zero"));
        }
        if let Some(remote) = &self.remote {
            if remote.timeout_seconds == 0 {
                return Err(validation("remote.timeout_seconds must be greater than zero"));
            }
        }
        Ok(())
    }

    /// The `[defaults]` table as a configuration.
    pub fn default_configuration(&self) -> Result<Configuration, SettingsError> {
        self.defaults
            .iter()
            .map(|(key, value)| {
                serde_json::to_value(value)
                    .map(|json| (key.clone(), json))
                    .map_err(|e| SettingsError::ValidationError {
                        message: format!("defaults.{key} cannot be represented as JSON: {e}"),
                    })
            })
            .collect()
    }

    /// Build the source described by these settings.
    pub fn source(&self) -> Result<Source, SettingsError> {
        match &self.remote {
            Some(remote) => {
                let credentials = CredentialSource::Env {
                    host_var: remote.host_env.clone(),
                    token_var: remote.token_env.clone(),
                };
                let source = RemoteSource::new(
                    credentials,
                    remote.path.clone(),
                    Duration::from_secs(remote.timeout_seconds),
                )?;
                Ok(Source::Remote(source))
            }
            None => Ok(Source::File(
                FileStore::new(&self.store.path)
                    .with_format(self.store.format)
                    .with_lock_timeout(Duration::from_millis(self.store.lock_timeout_ms)),
            )),
        }
    }

    /// Everything [`crate::configurator::Configurator::init`] needs.
    pub fn init_options(&self) -> Result<InitOptions, SettingsError> {
        Ok(InitOptions::new(self.source()?, self.default_configuration()?)
            .with_interval(Duration::from_secs(self.refresh.interval_seconds))
            .with_policy(self.refresh.policy))
    }
}

fn validation(message: &str) -> SettingsError {
    SettingsError::ValidationError {
        message: message.to_string(),
    }
}
