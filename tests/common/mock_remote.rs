//! Mock config endpoint for testing the remote source.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const CONFIG_ROUTE: &str = "/api/buffer-configuration";

#[derive(Default)]
struct MockState {
    status: Mutex<u16>,
    body: Mutex<String>,
    auth_headers: Mutex<Vec<String>>,
}

/// A running mock endpoint serving whatever body/status it is told to.
#[derive(Clone)]
pub struct MockRemote {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockRemote {
    pub async fn start(status: u16, body: &str) -> Self {
        let state = Arc::new(MockState::default());
        *state.status.lock() = status;
        *state.body.lock() = body.to_string();

        let app = Router::new()
            .route(CONFIG_ROUTE, get(handle))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock remote");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond(&self, status: u16, body: &str) {
        *self.state.status.lock() = status;
        *self.state.body.lock() = body.to_string();
    }

    /// `Authorization` header values seen so far.
    pub fn auth_headers(&self) -> Vec<String> {
        self.state.auth_headers.lock().clone()
    }
}

async fn handle(State(state): State<Arc<MockState>>, headers: HeaderMap) -> (StatusCode, String) {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().push(value.to_string());
    }
    let status =
        StatusCode::from_u16(*state.status.lock()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = state.body.lock().clone();
    (status, body)
}
