//! Shared test harness for integration tests.
//!
//! Builds a full [`AppContext`] over an in-memory database and a temp cache
//! root, and can start Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use streambox::server::context::AppContext;
use streambox::server::router::build_router;
use streambox_core::config::Config;
use streambox_db::pool::{init_memory_pool, DbPool, PooledConnection};

pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    /// Keeps the cache root alive for the test's duration.
    pub cache_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Harness with test defaults: fixed secret, temp cache root.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.auth.secret = "integration-test-secret".into();
        Self::with_config(config)
    }

    pub fn with_config(mut config: Config) -> Self {
        let cache_dir = tempfile::tempdir().expect("failed to create cache dir");
        config.cache.root = cache_dir.path().to_path_buf();

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::build(config, db.clone());

        Self { ctx, db, cache_dir }
    }

    /// Start the server on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let addr = harness.spawn_server().await;
        (harness, addr)
    }

    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let addr = harness.spawn_server().await;
        (harness, addr)
    }

    async fn spawn_server(&self) -> SocketAddr {
        let app = build_router(self.ctx.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }

    pub fn conn(&self) -> PooledConnection {
        streambox_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }
}

/// Register a user over HTTP and return `(token, user_id)`.
pub async fn register_user(addr: SocketAddr, username: &str, password: &str) -> (String, i64) {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/auth/register"))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("register request failed");
    assert_eq!(response.status(), 201, "registration should succeed");

    let body: serde_json::Value = response.json().await.expect("register response json");
    let token = body["token"].as_str().expect("token in response").to_string();
    let user_id = body["user"]["id"].as_i64().expect("user id in response");
    (token, user_id)
}

/// Seed a local movie media item directly in the store.
pub fn seed_movie(harness: &TestHarness, title: &str, path: &str, size: i64) -> i64 {
    let conn = harness.conn();
    let item = streambox_db::queries::media::insert_media_item(
        &conn,
        &streambox_db::queries::media::NewMediaItem {
            kind: streambox_core::MediaKind::Movie,
            title: title.into(),
            year: Some(1999),
            file_path: path.trim_start_matches('/').into(),
            file_size: size,
            source_kind: streambox_core::SourceKind::Local,
            source_id: None,
            quality: Some("1080p".into()),
        },
    )
    .expect("seed movie");
    item.id.as_i64()
}
