//! Common test utilities for exercising the status API in-process.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tower::ServiceExt;

use playout_core::{
    load_config_from_str, testing::MockSupervisor, Config, ControllerStatus, StatusHandle,
};
use playout_server::{api::create_router, state::AppState};

/// In-process status server backed by a mock transmitter.
pub struct TestFixture {
    pub router: Router,
    /// Live status snapshot, writable by tests
    pub status: StatusHandle,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

pub fn test_config() -> Config {
    load_config_from_str(
        r#"
[transmit]
sink_url = "rtmp://live.example.com/app/super-secret-key"
overlay_path = "/srv/playout/overlay.png"

[catalog]
path = "/srv/playout/movies.json"

[server]
enabled = true
host = "127.0.0.1"
port = 9090
"#,
    )
    .expect("test config parses")
}

impl TestFixture {
    pub fn new() -> Self {
        let status: StatusHandle = Arc::new(RwLock::new(ControllerStatus::default()));
        let supervisor = Arc::new(MockSupervisor::new());
        let state = Arc::new(AppState::new(
            test_config(),
            Arc::clone(&status),
            supervisor as Arc<dyn playout_core::Supervisor>,
        ));

        Self {
            router: create_router(state),
            status,
        }
    }

    /// Send a GET request and parse the body as JSON.
    pub async fn get(&self, path: &str) -> TestResponse {
        let (status, bytes) = self.get_raw(path).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }

    /// Send a GET request and return the raw body.
    pub async fn get_raw(&self, path: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("request builds");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes()
            .to_vec();
        (status, bytes)
    }
}
