//! Pipeline lifecycle integration tests.
//!
//! These tests drive entities through both stages with mock providers:
//! submit -> poll -> cache -> completed (or failed)

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use genloom_core::{
    cache::{is_local_ref, local_path_of, SqliteUploadRecordStore},
    testing::{fixtures, MockPoll, MockProviderAdapter, MockResourceFetcher},
    usage::{create_usage_log, SqliteUsageStore, UsageFilter, UsageStore},
    ArtifactCache, BaseStageRequest, DerivedStageRequest, OrchestratorConfig, OrchestratorError,
    PipelineOrchestrator, ProviderRegistry, SourceImage, SqliteTaskStore, Stage, TaskStatus,
    TaskStore,
};

/// Test helper wiring an orchestrator to mocks and on-disk stores.
struct TestHarness {
    store: Arc<SqliteTaskStore>,
    uploads: Arc<SqliteUploadRecordStore>,
    base: Arc<MockProviderAdapter>,
    derived: Arc<MockProviderAdapter>,
    fetcher: Arc<MockResourceFetcher>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        Self {
            store: Arc::new(SqliteTaskStore::new(&db_path).expect("Failed to create task store")),
            uploads: Arc::new(
                SqliteUploadRecordStore::new(&db_path).expect("Failed to create upload store"),
            ),
            base: Arc::new(MockProviderAdapter::new("sora")),
            derived: Arc::new(MockProviderAdapter::new("sora-character")),
            fetcher: Arc::new(MockResourceFetcher::with_dir(temp_dir.path().join("resources"))),
            temp_dir,
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval_ms: 10,
            derived_provider: Some("sora-character".to_string()),
            ..Default::default()
        }
    }

    fn create_orchestrator(&self) -> PipelineOrchestrator {
        let registry = ProviderRegistry::new()
            .with_adapter(self.base.clone(), true)
            .with_adapter(self.derived.clone(), false);

        PipelineOrchestrator::new(
            Self::config(),
            self.store.clone(),
            registry,
            ArtifactCache::new(self.fetcher.clone()),
        )
        .with_upload_records(self.uploads.clone())
    }
}

#[tokio::test]
async fn test_base_then_derived() {
    let harness = TestHarness::new();
    let orch = harness.create_orchestrator();

    harness
        .base
        .push_polls(vec![
            MockPoll::status("queued"),
            MockPoll::running(Some(50.0)),
            MockPoll::completed("https://cdn.example/base.mp4"),
        ])
        .await;
    harness
        .derived
        .push_poll(MockPoll::completed("https://cdn.example/character.mp4"))
        .await;

    let base = orch
        .start_base_stage(BaseStageRequest::new("char-1", "a knight in silver armor"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(base.status, TaskStatus::Completed);
    assert_eq!(base.video_url.as_deref(), Some("https://cdn.example/base.mp4"));
    let local = base.local_ref.clone().unwrap();
    assert!(is_local_ref(&local));
    assert!(local_path_of(&local).unwrap().exists());

    let derived = orch
        .start_derived_stage(DerivedStageRequest::new("char-1"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(derived.stage, Stage::Derived);
    assert_eq!(derived.provider_id, "sora-character");
    assert_eq!(derived.status, TaskStatus::Completed);

    // The derived provider received the base clip's remote URL.
    let requests = harness.derived.generate_requests().await;
    assert_eq!(
        requests[0].values["metadata.character_url"],
        json!("https://cdn.example/base.mp4")
    );

    let history = orch.history("char-1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].stage, Stage::Derived);
    assert_eq!(harness.fetcher.download_count().await, 2);
}

#[tokio::test]
async fn test_in_progress_stage_rejects_new_start() {
    let harness = TestHarness::new();
    let orch = harness.create_orchestrator();

    let handle = orch
        .start_base_stage(BaseStageRequest::new("char-1", "first"))
        .await
        .unwrap();

    let err = orch
        .start_base_stage(BaseStageRequest::new("char-1", "second"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::StageInProgress { .. }));

    let err = orch
        .start_derived_stage(DerivedStageRequest::new("char-1").with_base_asset("https://x/a.mp4"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::StageInProgress { .. }));
    assert_eq!(harness.base.generate_count().await, 1);
    assert_eq!(harness.derived.generate_count().await, 0);

    harness
        .base
        .push_poll(MockPoll::completed("https://cdn.example/base.mp4"))
        .await;
    let record = handle.wait().await.unwrap();
    assert_eq!(record.status, TaskStatus::Completed);

    // Once finished, the entity accepts a new stage.
    harness
        .base
        .push_poll(MockPoll::completed("https://cdn.example/base2.mp4"))
        .await;
    orch.start_base_stage(BaseStageRequest::new("char-1", "again"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(harness.base.generate_count().await, 2);
}

#[tokio::test]
async fn test_persisted_in_progress_record_blocks_start() {
    let harness = TestHarness::new();
    harness
        .store
        .save(&fixtures::orphaned_record("char-1", "sora", "remote-1"))
        .unwrap();
    let orch = harness.create_orchestrator();

    let err = orch
        .start_base_stage(BaseStageRequest::new("char-1", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::StageInProgress { entity_id } if entity_id == "char-1"));
    assert_eq!(harness.base.generate_count().await, 0);
    assert_eq!(harness.base.poll_count().await, 0);
}

#[tokio::test]
async fn test_provider_failure_is_recorded() {
    let harness = TestHarness::new();
    let orch = harness.create_orchestrator();
    harness
        .base
        .push_poll(MockPoll::failed("prompt rejected by moderation"))
        .await;

    let record = orch
        .start_base_stage(BaseStageRequest::new("char-1", "x"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("prompt rejected by moderation"));
    assert!(record.local_ref.is_none());
    assert_eq!(harness.fetcher.download_count().await, 0);

    let stored = harness.store.get(&record.id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_cache_failure_keeps_remote_url() {
    let harness = TestHarness::new();
    harness.fetcher.set_fail_downloads(true).await;
    let orch = harness.create_orchestrator();
    harness
        .base
        .push_poll(MockPoll::completed("https://cdn.example/base.mp4"))
        .await;

    let record = orch
        .start_base_stage(BaseStageRequest::new("char-1", "x"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(record.status, TaskStatus::Completed);
    assert!(record.local_ref.is_none());
    assert_eq!(record.artifact_ref(), Some("https://cdn.example/base.mp4"));
}

#[tokio::test]
async fn test_derived_without_base_asset() {
    let harness = TestHarness::new();
    let orch = harness.create_orchestrator();

    let err = orch
        .start_derived_stage(DerivedStageRequest::new("char-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::MissingBaseAsset(_)));
    assert_eq!(harness.derived.generate_count().await, 0);
    assert!(!orch.is_active("char-1").await);
}

#[tokio::test]
async fn test_derived_uses_latest_completed_base() {
    let harness = TestHarness::new();
    harness
        .store
        .save(&fixtures::completed_base("char-1", "sora", "https://cdn.example/old.mp4"))
        .unwrap();
    harness
        .store
        .save(&fixtures::completed_base("char-1", "sora", "https://cdn.example/new.mp4"))
        .unwrap();
    harness
        .derived
        .push_poll(MockPoll::completed("https://cdn.example/character.mp4"))
        .await;
    let orch = harness.create_orchestrator();

    orch.start_derived_stage(DerivedStageRequest::new("char-1"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let requests = harness.derived.generate_requests().await;
    assert_eq!(
        requests[0].values["metadata.character_url"],
        json!("https://cdn.example/new.mp4")
    );
}

#[tokio::test]
async fn test_local_source_image_uploaded_once() {
    let harness = TestHarness::new();
    let image = harness.temp_dir.path().join("portrait.png");
    std::fs::write(&image, b"\x89PNG fake image bytes").unwrap();
    let orch = harness.create_orchestrator();

    for entity in ["char-1", "char-2"] {
        harness
            .base
            .push_poll(MockPoll::completed("https://cdn.example/base.mp4"))
            .await;
        orch.start_base_stage(
            BaseStageRequest::new(entity, "x").with_source_image(SourceImage::Local {
                path: image.clone(),
            }),
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    }

    assert_eq!(harness.base.upload_count().await, 1);
    let requests = harness.base.generate_requests().await;
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(
            request.values["image_url"],
            json!("https://mock.example/uploads/portrait.png")
        );
    }
}

#[tokio::test]
async fn test_usage_events_written() {
    let harness = TestHarness::new();
    let usage_store = Arc::new(SqliteUsageStore::in_memory().unwrap());
    let (usage, writer) = create_usage_log(usage_store.clone(), 64);
    let writer_task = tokio::spawn(writer.run());

    let orch = harness.create_orchestrator().with_usage(usage);
    harness
        .base
        .push_poll(MockPoll::completed("https://cdn.example/base.mp4"))
        .await;
    let record = orch
        .start_base_stage(BaseStageRequest::new("char-1", "x"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    drop(orch);
    tokio::time::timeout(Duration::from_secs(5), writer_task)
        .await
        .expect("usage writer did not stop")
        .unwrap();

    let events = usage_store
        .query(&UsageFilter::new().with_entity_id("char-1"))
        .unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["task_completed", "task_submitted"]);
    assert_eq!(events[0].task_id.as_deref(), Some(record.task_id.as_str()));
}
