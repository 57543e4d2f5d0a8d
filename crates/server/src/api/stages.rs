//! Stage lifecycle handlers: start, resume and inspect an entity's tasks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use genloom_core::{
    BaseStageRequest, DerivedStageRequest, OrchestratorError, SourceImage, Stage, TaskRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartBaseRequest {
    pub prompt: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub source_image: Option<SourceImage>,
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct StartDerivedRequest {
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Defaults to the entity's latest completed base video
    #[serde(default)]
    pub base_asset_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub stage: Option<Stage>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub resumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TaskRecord>,
}

#[derive(Debug, Serialize)]
pub struct TaskHistoryResponse {
    pub entity_id: String,
    /// Whether a polling loop in this process currently owns the entity
    pub active: bool,
    /// Newest first
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Serialize)]
pub struct StageErrorResponse {
    pub error: String,
}

/// An orchestrator failure rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::StageInProgress { .. } => StatusCode::CONFLICT,
            OrchestratorError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::MissingBaseAsset(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::Provider(_) | OrchestratorError::Upload(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Task(_) | OrchestratorError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %err, "Stage request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(StageErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit the base stage. The polling loop keeps running after the response.
pub async fn start_base(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(body): Json<StartBaseRequest>,
) -> Result<(StatusCode, Json<TaskRecord>), ApiError> {
    let request = BaseStageRequest {
        entity_id,
        provider_id: body.provider_id,
        prompt: body.prompt,
        source_image: body.source_image,
        overrides: body.overrides,
    };
    let handle = state.orchestrator().start_base_stage(request).await?;
    Ok((StatusCode::ACCEPTED, Json(handle.record)))
}

/// Submit the derived stage.
pub async fn start_derived(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(body): Json<StartDerivedRequest>,
) -> Result<(StatusCode, Json<TaskRecord>), ApiError> {
    let request = DerivedStageRequest {
        entity_id,
        provider_id: body.provider_id,
        base_asset_url: body.base_asset_url,
        prompt: body.prompt,
        overrides: body.overrides,
    };
    let handle = state.orchestrator().start_derived_stage(request).await?;
    Ok((StatusCode::ACCEPTED, Json(handle.record)))
}

/// Pick up an in-progress record left behind by an earlier process.
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<(StatusCode, Json<ResumeResponse>), ApiError> {
    match state.orchestrator().resume(&entity_id).await? {
        Some(handle) => Ok((
            StatusCode::ACCEPTED,
            Json(ResumeResponse {
                resumed: true,
                record: Some(handle.record),
            }),
        )),
        None => Ok((
            StatusCode::OK,
            Json(ResumeResponse {
                resumed: false,
                record: None,
            }),
        )),
    }
}

/// Latest record for the entity, optionally for one stage.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(params): Query<TaskQueryParams>,
) -> Result<Json<TaskRecord>, ApiError> {
    state
        .orchestrator()
        .latest(&entity_id, params.stage)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no task for entity {}", entity_id)))
}

/// Every record for the entity.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<TaskHistoryResponse>, ApiError> {
    let tasks = state.orchestrator().history(&entity_id)?;
    let active = state.orchestrator().is_active(&entity_id).await;
    Ok(Json(TaskHistoryResponse {
        entity_id,
        active,
        tasks,
    }))
}
