//! Orchestrator types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::provider::ProviderError;
use crate::task::{TaskError, TaskRecord};

/// Errors from the pipeline orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a stage is already in progress for entity {entity_id}")]
    StageInProgress { entity_id: String },

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("no completed base asset for entity {0}")]
    MissingBaseAsset(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("task store error: {0}")]
    Task(#[from] TaskError),

    #[error("source image upload failed: {0}")]
    Upload(String),

    #[error("stage task ended abnormally: {0}")]
    Join(String),
}

/// Where the base stage's source image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceImage {
    /// Already reachable by the provider.
    Remote { url: String },
    /// Only on local disk; uploaded through the provider first.
    Local { path: PathBuf },
}

/// Request to start the base stage for an entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseStageRequest {
    pub entity_id: String,
    /// Explicit provider id. Falls back to configuration, then the video default.
    #[serde(default)]
    pub provider_id: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub source_image: Option<SourceImage>,
    /// Extra generate values keyed by parameter path.
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
}

impl BaseStageRequest {
    pub fn new(entity_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_source_image(mut self, image: SourceImage) -> Self {
        self.source_image = Some(image);
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

/// Request to start the derived stage for an entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivedStageRequest {
    pub entity_id: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Overrides the latest completed base record's video URL.
    #[serde(default)]
    pub base_asset_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
}

impl DerivedStageRequest {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_base_asset(mut self, url: impl Into<String>) -> Self {
        self.base_asset_url = Some(url.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

/// A started or resumed stage: the record as first persisted plus the
/// task driving it to a terminal state.
#[derive(Debug)]
pub struct StageHandle {
    pub record: TaskRecord,
    join: JoinHandle<TaskRecord>,
}

impl StageHandle {
    pub(crate) fn new(record: TaskRecord, join: JoinHandle<TaskRecord>) -> Self {
        Self { record, join }
    }

    /// Wait for the stage to finish and return the terminal record.
    pub async fn wait(self) -> Result<TaskRecord, OrchestratorError> {
        self.join
            .await
            .map_err(|e| OrchestratorError::Join(e.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
