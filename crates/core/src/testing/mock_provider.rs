//! Mock provider adapter for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use crate::provider::{
    GenerateRequest, GeneratedTask, ProviderAdapter, ProviderError, StatusSnapshot, ToolKind,
    UploadedFile,
};

/// One scripted answer to `poll_status`.
#[derive(Debug, Clone)]
pub enum MockPoll {
    Status(StatusSnapshot),
    /// The call itself fails (connection reset and the like).
    Error(String),
    /// The provider answers with a non-2xx status.
    HttpError { status: u16, body: String },
}

impl MockPoll {
    /// A bare status string.
    pub fn status(status: &str) -> Self {
        MockPoll::Status(StatusSnapshot {
            status: Some(status.to_string()),
            raw: json!({ "status": status }),
            ..Default::default()
        })
    }

    pub fn running(progress: Option<f64>) -> Self {
        let mut raw = json!({ "status": "running" });
        if let Some(p) = progress {
            raw["progress"] = json!(p);
        }
        MockPoll::Status(StatusSnapshot {
            status: Some("running".to_string()),
            raw,
            ..Default::default()
        })
    }

    pub fn completed(video_url: &str) -> Self {
        MockPoll::Status(StatusSnapshot {
            status: Some("completed".to_string()),
            video_url: Some(video_url.to_string()),
            raw: json!({ "status": "completed", "output": { "video_url": video_url } }),
            ..Default::default()
        })
    }

    pub fn failed(reason: &str) -> Self {
        MockPoll::Status(StatusSnapshot {
            status: Some("failed".to_string()),
            raw: json!({ "status": "failed", "error": { "message": reason } }),
            ..Default::default()
        })
    }

    pub fn network_error(message: &str) -> Self {
        MockPoll::Error(message.to_string())
    }

    pub fn http_error(status: u16, body: &str) -> Self {
        MockPoll::HttpError {
            status,
            body: body.to_string(),
        }
    }
}

/// Mock implementation of the ProviderAdapter trait.
///
/// Poll answers are consumed from a queue; an empty queue answers
/// "running". Generated task ids are taken from a queue too, falling back
/// to `mock-task-{n}`.
///
/// # Example
///
/// ```rust,ignore
/// let adapter = MockProviderAdapter::new("sora");
/// adapter.push_polls(vec![
///     MockPoll::network_error("reset"),
///     MockPoll::completed("https://cdn.example/clip.mp4"),
/// ]).await;
///
/// let task = adapter.generate(GenerateRequest::new()).await?;
/// assert_eq!(task.task_id, "mock-task-1");
/// ```
#[derive(Debug)]
pub struct MockProviderAdapter {
    id: String,
    tool_kind: ToolKind,
    polls: Arc<RwLock<VecDeque<MockPoll>>>,
    task_ids: Arc<RwLock<VecDeque<String>>>,
    /// If set, the next generate call fails with this message.
    next_error: Arc<RwLock<Option<String>>>,
    generated: Arc<RwLock<Vec<GenerateRequest>>>,
    polled: Arc<RwLock<Vec<String>>>,
    uploaded: Arc<RwLock<Vec<PathBuf>>>,
    task_counter: Arc<RwLock<u32>>,
}

impl MockProviderAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_kind: ToolKind::VideoGen,
            polls: Arc::new(RwLock::new(VecDeque::new())),
            task_ids: Arc::new(RwLock::new(VecDeque::new())),
            next_error: Arc::new(RwLock::new(None)),
            generated: Arc::new(RwLock::new(Vec::new())),
            polled: Arc::new(RwLock::new(Vec::new())),
            uploaded: Arc::new(RwLock::new(Vec::new())),
            task_counter: Arc::new(RwLock::new(0)),
        }
    }

    pub fn with_tool_kind(mut self, kind: ToolKind) -> Self {
        self.tool_kind = kind;
        self
    }

    pub async fn push_poll(&self, poll: MockPoll) {
        self.polls.write().await.push_back(poll);
    }

    pub async fn push_polls(&self, polls: Vec<MockPoll>) {
        self.polls.write().await.extend(polls);
    }

    /// Queue the task id the next generate call returns.
    pub async fn push_task_id(&self, task_id: impl Into<String>) {
        self.task_ids.write().await.push_back(task_id.into());
    }

    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    pub async fn generate_requests(&self) -> Vec<GenerateRequest> {
        self.generated.read().await.clone()
    }

    pub async fn generate_count(&self) -> usize {
        self.generated.read().await.len()
    }

    /// Task ids passed to `poll_status`, in call order.
    pub async fn polled_task_ids(&self) -> Vec<String> {
        self.polled.read().await.clone()
    }

    pub async fn poll_count(&self) -> usize {
        self.polled.read().await.len()
    }

    pub async fn uploaded_paths(&self) -> Vec<PathBuf> {
        self.uploaded.read().await.clone()
    }

    pub async fn upload_count(&self) -> usize {
        self.uploaded.read().await.len()
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn tool_kind(&self) -> ToolKind {
        self.tool_kind
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedTask, ProviderError> {
        if let Some(message) = self.next_error.write().await.take() {
            return Err(ProviderError::Http {
                status: 500,
                body: message,
            });
        }

        self.generated.write().await.push(request);

        let task_id = match self.task_ids.write().await.pop_front() {
            Some(id) => id,
            None => {
                let mut counter = self.task_counter.write().await;
                *counter += 1;
                format!("mock-task-{}", *counter)
            }
        };

        Ok(GeneratedTask {
            raw: json!({ "id": task_id }),
            task_id,
        })
    }

    async fn poll_status(&self, task_id: &str) -> Result<StatusSnapshot, ProviderError> {
        self.polled.write().await.push(task_id.to_string());

        match self.polls.write().await.pop_front() {
            Some(MockPoll::Status(snapshot)) => Ok(snapshot),
            Some(MockPoll::Error(message)) => Err(ProviderError::Transport(message)),
            Some(MockPoll::HttpError { status, body }) => Err(ProviderError::Http { status, body }),
            None => Ok(StatusSnapshot {
                status: Some("running".to_string()),
                raw: json!({ "status": "running" }),
                ..Default::default()
            }),
        }
    }

    async fn upload(&self, path: &Path) -> Result<UploadedFile, ProviderError> {
        if !path.exists() {
            return Err(ProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )));
        }
        self.uploaded.write().await.push(path.to_path_buf());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let url = format!("https://mock.example/uploads/{}", name);
        Ok(UploadedFile {
            raw: json!({ "url": url }),
            image_url: url,
        })
    }
}
