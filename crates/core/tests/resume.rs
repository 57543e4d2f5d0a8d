//! Restart recovery tests.
//!
//! A record left `in_progress` by an earlier process must be picked up by
//! the next one: polling resumes against the same remote task and no new
//! generate call is issued.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use genloom_core::{
    testing::{fixtures, MockPoll, MockProviderAdapter, MockResourceFetcher},
    ArtifactCache, BaseStageRequest, OrchestratorConfig, OrchestratorError, PipelineOrchestrator,
    ProviderRegistry, SqliteTaskStore, TaskStatus, TaskStore,
};

fn orchestrator(
    store: Arc<SqliteTaskStore>,
    adapter: Arc<MockProviderAdapter>,
    temp_dir: &TempDir,
) -> PipelineOrchestrator {
    let config = OrchestratorConfig {
        poll_interval_ms: 10,
        ..Default::default()
    };
    PipelineOrchestrator::new(
        config,
        store,
        ProviderRegistry::new().with_adapter(adapter, true),
        ArtifactCache::new(Arc::new(MockResourceFetcher::with_dir(
            temp_dir.path().join("resources"),
        ))),
    )
}

#[tokio::test]
async fn test_resume_all_polls_without_generating() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTaskStore::new(&temp_dir.path().join("tasks.db")).unwrap());
    let orphan = fixtures::orphaned_record("char-1", "sora", "remote-42");
    store.save(&orphan).unwrap();

    let adapter = Arc::new(MockProviderAdapter::new("sora"));
    adapter
        .push_polls(vec![
            MockPoll::running(Some(80.0)),
            MockPoll::completed("https://cdn.example/clip.mp4"),
        ])
        .await;
    let orch = orchestrator(store.clone(), adapter.clone(), &temp_dir);

    let handles = orch.resume_all().await.unwrap();
    assert_eq!(handles.len(), 1);

    let first = &handles[0].record;
    assert_eq!(first.id, orphan.id);
    assert_eq!(first.poller_session.as_deref(), Some(orch.session_id()));
    assert!(first.resumed_at.is_some());

    // The ownership marker is persisted before polling.
    let stored = store.get(&orphan.id).unwrap().unwrap();
    assert_eq!(stored.poller_session.as_deref(), Some(orch.session_id()));

    let mut handles = handles;
    let record = handles.remove(0).wait().await.unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.video_url.as_deref(), Some("https://cdn.example/clip.mp4"));
    // Earlier log lines survive and the resume is logged.
    assert_eq!(record.logs[0].message, orphan.logs[0].message);
    assert!(record.logs.iter().any(|l| l.message.contains("resumed")));

    assert_eq!(adapter.generate_count().await, 0);
    assert!(adapter
        .polled_task_ids()
        .await
        .iter()
        .all(|id| id == "remote-42"));
}

#[tokio::test]
async fn test_restart_across_orchestrators() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("tasks.db");

    // First process: submit and leave the stage running.
    let first_adapter = Arc::new(MockProviderAdapter::new("sora"));
    first_adapter.push_task_id("remote-7").await;
    let first = orchestrator(
        Arc::new(SqliteTaskStore::new(&db_path).unwrap()),
        first_adapter.clone(),
        &temp_dir,
    );
    let handle = first
        .start_base_stage(BaseStageRequest::new("char-1", "a knight"))
        .await
        .unwrap();
    let record_id = handle.record.id.clone();
    let first_store = SqliteTaskStore::new(&db_path).unwrap();

    // Let the first loop log the running status once; it writes nothing
    // more while the status is unchanged, which stands in for a dead process.
    for _ in 0..200 {
        let logs = first_store.get(&record_id).unwrap().unwrap().logs.len();
        if logs >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(handle);
    drop(first);

    // Second process on the same database.
    let adapter = Arc::new(MockProviderAdapter::new("sora"));
    adapter
        .push_poll(MockPoll::completed("https://cdn.example/clip.mp4"))
        .await;
    let store = Arc::new(SqliteTaskStore::new(&db_path).unwrap());
    let second = orchestrator(store.clone(), adapter.clone(), &temp_dir);

    let handle = second.resume("char-1").await.unwrap().expect("record resumed");
    assert_eq!(handle.record.id, record_id);
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(adapter.generate_count().await, 0);
    assert_eq!(adapter.polled_task_ids().await, vec!["remote-7".to_string()]);
}

#[tokio::test]
async fn test_resume_is_idempotent_within_session() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTaskStore::new(&temp_dir.path().join("tasks.db")).unwrap());
    store
        .save(&fixtures::orphaned_record("char-1", "sora", "remote-1"))
        .unwrap();

    let adapter = Arc::new(MockProviderAdapter::new("sora"));
    let orch = orchestrator(store, adapter.clone(), &temp_dir);

    let handle = orch.resume("char-1").await.unwrap().expect("first resume");
    assert!(orch.resume("char-1").await.unwrap().is_none());
    assert!(orch.resume_all().await.unwrap().is_empty());

    adapter
        .push_poll(MockPoll::completed("https://cdn.example/clip.mp4"))
        .await;
    handle.wait().await.unwrap();
    assert!(orch.resume("char-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_with_unknown_provider() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTaskStore::new(&temp_dir.path().join("tasks.db")).unwrap());
    store
        .save(&fixtures::orphaned_record("char-1", "removed-provider", "remote-1"))
        .unwrap();

    let orch = orchestrator(
        store.clone(),
        Arc::new(MockProviderAdapter::new("sora")),
        &temp_dir,
    );

    let err = orch.resume("char-1").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ProviderNotFound(id) if id == "removed-provider"));
    assert!(!orch.is_active("char-1").await);

    // resume_all skips it instead of failing.
    assert!(orch.resume_all().await.unwrap().is_empty());
    assert!(store.load_in_progress("char-1").unwrap().is_some());
}
