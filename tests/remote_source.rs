mod common;

use std::net::TcpListener;
use std::time::Duration;

use common::mock_remote::MockRemote;
use common::version_defaults;
use confstore::config::{CredentialSource, SecureString};
use confstore::store::{DEFAULT_REMOTE_PATH, DEFAULT_REMOTE_TIMEOUT};
use confstore::{
    Configurator, InitError, InitOptions, InitPolicy, MutationError, RemoteSource, StoreError,
};
use serde_json::json;

const ENVELOPE: &str = r#"{"data": {"item": [
    {"key": "buffer_size", "value": "512"},
    {"key": "flush_ms", "value": "250"}
]}}"#;

fn remote_for(host: String) -> RemoteSource {
    RemoteSource::new(
        CredentialSource::Static {
            host,
            token: SecureString::new("secret-token".to_string()),
        },
        DEFAULT_REMOTE_PATH,
        DEFAULT_REMOTE_TIMEOUT,
    )
    .unwrap()
}

/// A host nothing is listening on.
fn dead_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_fetch_parses_envelope_and_sends_bearer() {
    let mock = MockRemote::start(200, ENVELOPE).await;
    let remote = remote_for(mock.host());

    let config = remote.fetch().await.unwrap();
    assert_eq!(config.get("buffer_size"), Some(&json!("512")));
    assert_eq!(config.get("flush_ms"), Some(&json!("250")));
    assert_eq!(mock.auth_headers(), vec!["Bearer secret-token".to_string()]);
}

#[tokio::test]
async fn test_non_success_status_is_reported() {
    let mock = MockRemote::start(503, "unavailable").await;
    let err = remote_for(mock.host()).fetch().await.unwrap_err();
    assert!(matches!(err, StoreError::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let mock = MockRemote::start(200, r#"{"data": {"nope": []}}"#).await;
    let err = remote_for(mock.host()).fetch().await.unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }));
}

#[tokio::test]
async fn test_unreachable_remote_fails_strict_init() {
    let options = InitOptions::remote(remote_for(dead_host()), version_defaults())
        .with_policy(InitPolicy::Strict);
    let err = Configurator::init(options).await.err().unwrap();
    assert!(matches!(
        err,
        InitError::Load {
            source: StoreError::Http(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_remote_serves_defaults_then_converges() {
    let mock = MockRemote::start(500, "boom").await;
    let store = Configurator::init(
        InitOptions::remote(remote_for(mock.host()), version_defaults())
            .with_interval(Duration::from_millis(20)),
    )
    .await
    .unwrap();
    assert_eq!(store.get(), version_defaults());

    mock.respond(200, ENVELOPE);
    let converged =
        common::eventually(Duration::from_secs(5), || store.has("buffer_size")).await;
    assert!(converged);
    assert!(!store.has("version"));
    store.shutdown().await;
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_snapshot() {
    let mock = MockRemote::start(200, ENVELOPE).await;
    let store = Configurator::init(InitOptions::remote(remote_for(mock.host()), version_defaults()))
        .await
        .unwrap();
    assert_eq!(store.value("buffer_size"), Some(json!("512")));

    mock.respond(500, "boom");
    assert!(store.reload().await.is_err());
    assert_eq!(store.value("buffer_size"), Some(json!("512")));
    store.shutdown().await;
}

#[tokio::test]
async fn test_remote_source_is_read_only() {
    let mock = MockRemote::start(200, ENVELOPE).await;
    let store = Configurator::init(InitOptions::remote(remote_for(mock.host()), version_defaults()))
        .await
        .unwrap();

    let err = store.add("new_key", "x").unwrap_err();
    assert!(matches!(err, MutationError::Store(StoreError::ReadOnly)));
    assert!(!store.has("new_key"));

    assert!(matches!(
        store.update("buffer_size", "1024"),
        Err(MutationError::Store(StoreError::ReadOnly))
    ));
    assert_eq!(store.value("buffer_size"), Some(json!("512")));
    store.shutdown().await;
}
