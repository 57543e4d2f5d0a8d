//! In-process server fixture backed by mock providers.
//!
//! Requests go straight through the router with `tower::ServiceExt::oneshot`;
//! task, upload and usage stores live in a temporary SQLite file.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use genloom_core::{
    create_usage_log,
    testing::{MockProviderAdapter, MockResourceFetcher},
    ArtifactCache, Config, DatabaseConfig, OrchestratorConfig, PipelineOrchestrator,
    ProviderRegistry, SqliteTaskStore, SqliteUploadRecordStore, SqliteUsageStore, TaskStore,
    UsageStore,
};
use genloom_server::{create_router, AppState};

pub use genloom_core::testing::{fixtures, MockPoll};

pub struct TestFixture {
    pub router: Router,
    /// Default video provider, id `sora`
    pub base: Arc<MockProviderAdapter>,
    /// Derived stage provider, id `sora-character`
    pub derived: Arc<MockProviderAdapter>,
    pub fetcher: Arc<MockResourceFetcher>,
    pub task_store: Arc<dyn TaskStore>,
    pub usage_store: Arc<dyn UsageStore>,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let base = Arc::new(MockProviderAdapter::new("sora"));
        let derived = Arc::new(MockProviderAdapter::new("sora-character"));
        let fetcher = Arc::new(MockResourceFetcher::with_dir(
            temp_dir.path().join("resources"),
        ));

        let task_store: Arc<dyn TaskStore> =
            Arc::new(SqliteTaskStore::new(&db_path).expect("Failed to create task store"));
        let usage_store: Arc<dyn UsageStore> =
            Arc::new(SqliteUsageStore::new(&db_path).expect("Failed to create usage store"));
        let uploads = Arc::new(
            SqliteUploadRecordStore::new(&db_path).expect("Failed to create upload store"),
        );

        let (usage_handle, usage_writer) = create_usage_log(Arc::clone(&usage_store), 100);
        tokio::spawn(usage_writer.run());

        let orchestrator_config = OrchestratorConfig {
            poll_interval_ms: 10,
            derived_provider: Some("sora-character".to_string()),
            ..Default::default()
        };
        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            orchestrator: orchestrator_config.clone(),
            ..Default::default()
        };

        let registry = ProviderRegistry::new()
            .with_adapter(base.clone(), true)
            .with_adapter(derived.clone(), false);

        let orchestrator = PipelineOrchestrator::new(
            orchestrator_config,
            Arc::clone(&task_store),
            registry,
            ArtifactCache::new(fetcher.clone()),
        )
        .with_upload_records(uploads)
        .with_usage(usage_handle);

        let state = Arc::new(AppState::new(
            config,
            orchestrator,
            Arc::clone(&usage_store),
        ));

        Self {
            router: create_router(state),
            base,
            derived,
            fetcher,
            task_store,
            usage_store,
            temp_dir,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Raw response text, for non-JSON endpoints.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }

    /// Poll the latest task for `entity_id` until it reaches `status`.
    pub async fn wait_for_status(&self, entity_id: &str, status: &str) -> Value {
        let uri = format!("/api/v1/entities/{}/task", entity_id);
        for _ in 0..200 {
            let response = self.get(&uri).await;
            if response.status == StatusCode::OK && response.body["status"] == status {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("entity {} never reached status {}", entity_id, status);
    }
}
