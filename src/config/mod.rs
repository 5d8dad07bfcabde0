pub mod credentials;
pub mod diff;
pub mod settings;
pub mod types;

pub use credentials::{CredentialSource, ResolvedCredentials, SecureString};
pub use diff::ConfigDiff;
pub use settings::{RefreshSettings, RemoteSettings, Settings, SettingsError, StoreSettings};
pub use types::{Configuration, Value};
