//! Mock provider HTTP server for transport tests
//!
//! Answers every request with the next queued response and records what it
//! received.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Request seen by the mock
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct MockProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    responses: Mutex<VecDeque<(u16, serde_json::Value)>>,
    requests: Mutex<Vec<Captured>>,
}

impl MockProvider {
    /// Start a server that replies with `responses` in order, then 500s
    pub async fn start(responses: Vec<(u16, serde_json::Value)>) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL in the shape of the Generative Language API
    pub fn google_base_url(&self) -> Url {
        Url::parse(&format!("http://{}/v1beta", self.addr)).unwrap()
    }

    /// Base URL in the shape of the Anthropic API
    pub fn anthropic_base_url(&self) -> Url {
        Url::parse(&format!("http://{}/v1", self.addr)).unwrap()
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.requests.lock().unwrap().push(Captured {
        path: uri.path().to_owned(),
        headers,
        body,
    });

    let (status, body) = state.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
        (
            500,
            serde_json::json!({ "error": { "code": 500, "message": "no scripted response", "status": "INTERNAL" } }),
        )
    });

    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}
