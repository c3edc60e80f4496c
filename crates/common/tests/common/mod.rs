//! Shared test utilities for upload, quota and link integration tests
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ::common::account::AccountId;
use ::common::auth::{MemoryRequestLedger, StaticTokenVerifier};
use ::common::links::PublicLinkIndex;
use ::common::quota::QuotaLedger;
use ::common::sandbox::{PathSandbox, SandboxLimits};
use ::common::store::MemoryMetadataStore;
use ::common::upload::{Inbound, Reply, SessionContext, UploadSession};
use tempfile::TempDir;

pub const U1_TOKEN: &str = "token-u1";
pub const U2_TOKEN: &str = "token-u2";

pub struct TestEnv {
    pub ctx: SessionContext<MemoryMetadataStore>,
    pub store: MemoryMetadataStore,
    pub sandbox: Arc<PathSandbox>,
    pub requests: MemoryRequestLedger,
    pub temp: TempDir,
}

impl TestEnv {
    pub fn u1(&self) -> AccountId {
        AccountId::from("u1")
    }

    /// `<root>/u1/cloud`, created on setup
    pub fn u1_cloud(&self) -> PathBuf {
        self.sandbox.program_root(&self.u1(), "cloud")
    }

    pub fn quota(&self) -> &QuotaLedger<MemoryMetadataStore> {
        &self.ctx.quota
    }

    pub fn links(&self) -> &PublicLinkIndex<MemoryMetadataStore> {
        &self.ctx.links
    }

    pub fn session(&self) -> UploadSession<MemoryMetadataStore> {
        UploadSession::new(self.ctx.clone())
    }
}

/// Set up a sandbox in a temp dir with accounts `u1` and `u2`, each with
///  a `cloud` program, and a quota ceiling of `ceiling` bytes
pub fn setup_test_env(ceiling: u64) -> TestEnv {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("cloud");

    let sandbox = Arc::new(PathSandbox::new(&root, SandboxLimits::default()));
    for account in ["u1", "u2"] {
        std::fs::create_dir_all(sandbox.program_root(&AccountId::from(account), "cloud")).unwrap();
    }

    let store = MemoryMetadataStore::new();
    let requests = MemoryRequestLedger::new(500);
    let verifier: StaticTokenVerifier = [(U1_TOKEN, "u1"), (U2_TOKEN, "u2")].into_iter().collect();

    let ctx = SessionContext {
        sandbox: sandbox.clone(),
        quota: QuotaLedger::new(store.clone(), ceiling),
        links: PublicLinkIndex::new(store.clone(), sandbox.clone()),
        verifier: Arc::new(verifier),
        requests: Arc::new(requests.clone()),
        idle_timeout: Duration::from_secs(60),
    };

    TestEnv {
        ctx,
        store,
        sandbox,
        requests,
        temp,
    }
}

pub fn text(json: serde_json::Value) -> Inbound {
    Inbound::Text(json.to_string())
}

pub fn frame(bytes: &[u8]) -> Inbound {
    Inbound::Binary(bytes::Bytes::copy_from_slice(bytes))
}

pub fn token(credential: &str) -> Inbound {
    text(serde_json::json!({ "type": "token", "data": credential }))
}

/// An `option` message for `name` in the program root
pub fn option(name: &str, size: u64) -> Inbound {
    text(serde_json::json!({
        "type": "option",
        "data": {
            "name": name,
            "dir": "/",
            "mtimeMs": 1_600_000_000_000u64,
            "birthtimeMs": 1_500_000_000_000u64,
            "size": size,
        }
    }))
}

pub fn close() -> Inbound {
    text(serde_json::json!({ "type": "close" }))
}

/// Drive a session to `Streaming` on `name` with `size` declared
pub async fn open_upload(
    session: &mut UploadSession<MemoryMetadataStore>,
    name: &str,
    size: u64,
) -> Reply {
    let reply = session.handle(token(U1_TOKEN)).await.unwrap();
    assert!(!reply.is_rejection(), "token rejected: {reply:?}");
    session.handle(option(name, size)).await.unwrap()
}
