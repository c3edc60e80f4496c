//! Shared setup for HTTP API integration tests
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use http::{header, Method, Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use ::common::account::AccountId;
use ::common::auth::StaticTokenVerifier;
use ::common::sandbox::{PathSandbox, SandboxLimits};
use stratus_daemon::database::{Database, DatabaseRequestLedger};
use stratus_daemon::http_server;
use stratus_daemon::ServiceState;

pub const U1_TOKEN: &str = "token-u1";
pub const U2_TOKEN: &str = "token-u2";
/// Maps to an account id that cannot be a directory name
pub const BAD_ID_TOKEN: &str = "token-bad";

pub struct TestApp {
    pub state: ServiceState,
    pub temp: TempDir,
}

impl TestApp {
    pub fn u1(&self) -> AccountId {
        AccountId::from("u1")
    }

    pub fn u2(&self) -> AccountId {
        AccountId::from("u2")
    }

    /// `<root>/u1/cloud`
    pub fn u1_cloud(&self) -> PathBuf {
        self.state.sandbox().program_root(&self.u1(), "cloud")
    }

    pub async fn u1_capacity(&self) -> u64 {
        self.state.quota().capacity(&self.u1()).await
    }

    /// Send a request through the full router
    pub async fn send(&self, request: Request<Body>) -> Response {
        http_server::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    /// Send a request, parsing the body as JSON (`Null` when empty)
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(request(method, uri, token, body)).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Register `token`'s account, asserting success
    pub async fn register(&self, token: &str) {
        let (status, body) = self.call(Method::POST, "/api/v0/register", Some(token), None).await;
        assert_eq!(status, StatusCode::OK, "registration failed: {body}");
    }

    /// Write `contents` below u1's cloud program and charge them to the ledger
    pub async fn put_file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.u1_cloud().join(relative);
        tokio::fs::write(&path, contents).await.unwrap();
        self.state
            .quota()
            .change_capacity(&self.u1(), contents.len() as i64)
            .await;
        path
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Reason code of a rejected request
pub fn reason(body: &Value) -> &str {
    body["reason"].as_str().unwrap_or_default()
}

/// Service state over an in-memory database and a temp sandbox. Tokens
///  for `u1`, `u2` and an invalid account id are configured.
pub async fn setup_test_app(ceiling: u64, request_limit: u64) -> TestApp {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("cloud");
    std::fs::create_dir_all(&root).unwrap();

    let database = Database::in_memory().await.unwrap();
    let sandbox = Arc::new(PathSandbox::new(&root, SandboxLimits::default()));
    let verifier: StaticTokenVerifier = [
        (U1_TOKEN, "u1"),
        (U2_TOKEN, "u2"),
        (BAD_ID_TOKEN, "not/a name"),
    ]
    .into_iter()
    .collect();

    let state = ServiceState::new(
        database.clone(),
        sandbox,
        verifier,
        DatabaseRequestLedger::new(database, request_limit),
        ceiling,
        Duration::from_secs(60),
    );

    TestApp { state, temp }
}

/// [`setup_test_app`] with `u1` already registered
pub async fn setup_registered(ceiling: u64) -> TestApp {
    let app = setup_test_app(ceiling, 10_000).await;
    app.register(U1_TOKEN).await;
    app
}
