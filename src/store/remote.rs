//! Read-only config source backed by an HTTP endpoint.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::config::credentials::CredentialSource;
use crate::config::Configuration;
use crate::store::codec::{self, Format};
use crate::store::error::StoreError;

pub const DEFAULT_REMOTE_PATH: &str = "/api/buffer-configuration?populate=*";
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches the `data.item[]` envelope from `{host}{path}` with a bearer token.
///
/// Host and token are resolved from [`CredentialSource`] on every fetch so
/// rotated credentials are picked up without a restart.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: Client,
    credentials: CredentialSource,
    path: String,
    format: Format,
}

impl RemoteSource {
    /// Build a source with a fixed request timeout.
    pub fn new(
        credentials: CredentialSource,
        path: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
            path: path.into(),
            format: Format::Envelope,
        })
    }

    /// Override the expected response shape (the endpoint serves envelopes).
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Endpoint as currently resolved from the credential source.
    pub fn endpoint(&self) -> String {
        let host = self.credentials.resolve().host;
        join_url(&host, &self.path)
    }

    pub async fn fetch(&self) -> Result<Configuration, StoreError> {
        let credentials = self.credentials.resolve();
        let url = join_url(&credentials.host, &self.path);

        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(credentials.token.expose())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        codec::decode(self.format, &body).map_err(|source| StoreError::Parse {
            origin: url,
            source,
        })
    }
}

fn join_url(host: &str, path: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), path)
}
