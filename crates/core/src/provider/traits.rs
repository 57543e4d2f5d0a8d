//! The uniform provider interface.

use std::path::Path;

use async_trait::async_trait;

use super::{GenerateRequest, GeneratedTask, ProviderError, StatusSnapshot, ToolKind, UploadedFile};

/// A generation provider, driven by its endpoint descriptors.
///
/// No operation retries internally.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> &str;

    fn tool_kind(&self) -> ToolKind;

    /// Submit a job. Fails on transport errors, non-2xx answers, or a
    /// response without a task id.
    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedTask, ProviderError>;

    /// Observe a previously submitted job.
    async fn poll_status(&self, task_id: &str) -> Result<StatusSnapshot, ProviderError>;

    /// Upload a local file and return the URL the provider hosts it at.
    async fn upload(&self, path: &Path) -> Result<UploadedFile, ProviderError>;
}
