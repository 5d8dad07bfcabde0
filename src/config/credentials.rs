//! Bearer credential handling for the remote source.
//!
//! Tokens are read from the environment on every fetch and wrapped so they
//! never end up in logs.

use std::env;

/// Wrapper for sensitive strings that prevents accidental logging.
///
/// The inner value is never exposed via Debug or Display traits.
/// Use `expose()` to access the actual value when building a request.
#[derive(Clone)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Expose the inner value.
    ///
    /// Use sparingly and only when actually sending to the remote.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString(••••••••)")
    }
}

impl std::fmt::Display for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "••••••••")
    }
}

/// Where the remote host and token come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Looked up in the process environment at fetch time.
    Env { host_var: String, token_var: String },
    /// Fixed values supplied by the caller.
    Static { host: String, token: SecureString },
}

/// Host and bearer token resolved for a single fetch.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub host: String,
    pub token: SecureString,
}

impl CredentialSource {
    /// Resolve host and token.
    ///
    /// Unset environment variables resolve to empty strings, the same as an
    /// unauthenticated request against an unset host. The fetch then fails
    /// like any other unreachable source.
    pub fn resolve(&self) -> ResolvedCredentials {
        match self {
            Self::Env {
                host_var,
                token_var,
            } => ResolvedCredentials {
                host: env::var(host_var).unwrap_or_default(),
                token: SecureString::new(env::var(token_var).unwrap_or_default()),
            },
            Self::Static { host, token } => ResolvedCredentials {
                host: host.clone(),
                token: token.clone(),
            },
        }
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::Env {
            host_var: "CORE_HOST".to_string(),
            token_var: "CORE_TOKEN".to_string(),
        }
    }
}
