//! HTTP API tests against an in-process router with mock providers.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, MockPoll, TestFixture};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["orchestrator"]["poll_interval_ms"], 10);
    assert_eq!(response.body["credentials"]["user_id_configured"], false);
    assert!(response.body["providers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_providers() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/providers").await;
    assert_eq!(response.status, StatusCode::OK);

    let providers = response.body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[0]["id"], "sora");
    assert_eq!(providers[0]["tool_kind"], "video_gen");
    assert_eq!(providers[0]["is_default"], true);
    assert_eq!(providers[1]["id"], "sora-character");
    assert_eq!(providers[1]["is_default"], false);
}

#[tokio::test]
async fn test_base_stage_runs_to_completion() {
    let fixture = TestFixture::new().await;
    fixture
        .base
        .push_polls(vec![
            MockPoll::running(Some(40.0)),
            MockPoll::completed("https://cdn.example/hero.mp4"),
        ])
        .await;

    let response = fixture
        .post(
            "/api/v1/entities/hero/stages/base",
            json!({ "prompt": "a knight in the rain" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["status"], "in_progress");
    assert_eq!(response.body["stage"], "base");
    assert_eq!(response.body["provider_id"], "sora");

    let task = fixture.wait_for_status("hero", "completed").await;
    assert_eq!(task["video_url"], "https://cdn.example/hero.mp4");
    assert!(task["local_ref"]
        .as_str()
        .unwrap()
        .starts_with("local-resource://"));

    let requests = fixture.base.generate_requests().await;
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let fixture = TestFixture::new().await;

    let first = fixture
        .post("/api/v1/entities/hero/stages/base", json!({ "prompt": "p" }))
        .await;
    assert_eq!(first.status, StatusCode::ACCEPTED);

    let second = fixture
        .post("/api/v1/entities/hero/stages/base", json!({ "prompt": "p" }))
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.body["error"].as_str().unwrap().contains("hero"));

    let history = fixture.get("/api/v1/entities/hero/tasks").await;
    assert_eq!(history.body["active"], true);
    assert_eq!(history.body["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(fixture.base.generate_count().await, 1);
}

#[tokio::test]
async fn test_unknown_provider_is_not_found() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/entities/hero/stages/base",
            json!({ "prompt": "p", "provider_id": "nope" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_generate_failure_is_bad_gateway() {
    let fixture = TestFixture::new().await;
    fixture.base.set_next_error("upstream exploded").await;

    let response = fixture
        .post("/api/v1/entities/hero/stages/base", json!({ "prompt": "p" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    // Nothing was persisted and the entity is free again
    let task = fixture.get("/api/v1/entities/hero/task").await;
    assert_eq!(task.status, StatusCode::NOT_FOUND);
    let retry = fixture
        .post("/api/v1/entities/hero/stages/base", json!({ "prompt": "p" }))
        .await;
    assert_eq!(retry.status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_derived_without_base_is_unprocessable() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/entities/hero/stages/derived", json!({}))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(fixture.derived.generate_count().await, 0);
}

#[tokio::test]
async fn test_base_then_derived_history() {
    let fixture = TestFixture::new().await;
    fixture
        .base
        .push_poll(MockPoll::completed("https://cdn.example/base.mp4"))
        .await;
    fixture
        .derived
        .push_poll(MockPoll::completed("https://cdn.example/derived.mp4"))
        .await;

    fixture
        .post("/api/v1/entities/hero/stages/base", json!({ "prompt": "p" }))
        .await;
    fixture.wait_for_status("hero", "completed").await;

    let derived = fixture
        .post("/api/v1/entities/hero/stages/derived", json!({}))
        .await;
    assert_eq!(derived.status, StatusCode::ACCEPTED);
    assert_eq!(derived.body["stage"], "derived");
    assert_eq!(derived.body["provider_id"], "sora-character");

    let task = fixture.wait_for_status("hero", "completed").await;
    assert_eq!(task["stage"], "derived");

    let base_only = fixture.get("/api/v1/entities/hero/task?stage=base").await;
    assert_eq!(base_only.body["video_url"], "https://cdn.example/base.mp4");

    let history = fixture.get("/api/v1/entities/hero/tasks").await;
    let tasks = history.body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["stage"], "derived");
    assert_eq!(tasks[1]["stage"], "base");
    assert_eq!(history.body["active"], false);

    let request = &fixture.derived.generate_requests().await[0];
    assert_eq!(
        request.values["metadata.character_url"],
        "https://cdn.example/base.mp4"
    );
}

#[tokio::test]
async fn test_resume_orphaned_record() {
    let fixture = TestFixture::new().await;
    fixture
        .task_store
        .save(&fixtures::orphaned_record("hero", "sora", "remote-7"))
        .unwrap();
    fixture
        .base
        .push_poll(MockPoll::completed("https://cdn.example/resumed.mp4"))
        .await;

    let response = fixture.post("/api/v1/entities/hero/resume", json!({})).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["resumed"], true);
    assert_eq!(response.body["record"]["task_id"], "remote-7");

    let task = fixture.wait_for_status("hero", "completed").await;
    assert_eq!(task["video_url"], "https://cdn.example/resumed.mp4");
    assert!(task["resumed_at"].is_string());
    assert_eq!(fixture.base.generate_count().await, 0);
    assert_eq!(fixture.base.polled_task_ids().await, vec!["remote-7"]);

    let again = fixture.post("/api/v1/entities/hero/resume", json!({})).await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["resumed"], false);
}

#[tokio::test]
async fn test_usage_query_filters() {
    let fixture = TestFixture::new().await;
    fixture
        .base
        .push_poll(MockPoll::completed("https://cdn.example/hero.mp4"))
        .await;
    fixture
        .post("/api/v1/entities/hero/stages/base", json!({ "prompt": "p" }))
        .await;
    fixture.wait_for_status("hero", "completed").await;

    // The usage writer drains its channel asynchronously
    let mut body = json!(null);
    for _ in 0..100 {
        let response = fixture
            .get("/api/v1/usage?entity_id=hero&event_type=task_completed")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        body = response.body;
        if body["total"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(body["total"], 1);
    assert_eq!(body["records"][0]["data"]["video_url"], "https://cdn.example/hero.mp4");

    let paged = fixture.get("/api/v1/usage?limit=0").await;
    assert_eq!(paged.body["limit"], 1);
    assert_eq!(paged.body["offset"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, text) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("genloom_http_requests_total"));
    assert!(text.contains("/api/v1/health"));
    assert!(text.contains("genloom_active_entities"));
}
