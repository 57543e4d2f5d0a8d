use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use genloom_core::{UsageFilter, UsageRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// Maximum allowed limit for usage queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for usage queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the usage endpoint
#[derive(Debug, Deserialize)]
pub struct UsageQueryParams {
    /// Filter by remote task ID
    pub task_id: Option<String>,
    /// Filter by entity ID
    pub entity_id: Option<String>,
    /// Filter by event type (`provider_call`, `task_completed`, ...)
    pub event_type: Option<String>,
    /// Maximum number of records to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UsageQueryResponse {
    /// Newest first
    pub records: Vec<UsageRecord>,
    /// Total number of matching records
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct UsageErrorResponse {
    pub error: String,
}

fn storage_error(action: &str, e: impl std::fmt::Display) -> (StatusCode, Json<UsageErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(UsageErrorResponse {
            error: format!("Failed to {} usage records: {}", action, e),
        }),
    )
}

/// Query the usage log
pub async fn query_usage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageQueryParams>,
) -> Result<Json<UsageQueryResponse>, (StatusCode, Json<UsageErrorResponse>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut base_filter = UsageFilter::new();
    if let Some(ref task_id) = params.task_id {
        base_filter = base_filter.with_task_id(task_id);
    }
    if let Some(ref entity_id) = params.entity_id {
        base_filter = base_filter.with_entity_id(entity_id);
    }
    if let Some(ref event_type) = params.event_type {
        base_filter = base_filter.with_event_type(event_type);
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let records = state
        .usage_store()
        .query(&query_filter)
        .map_err(|e| storage_error("query", e))?;
    let total = state
        .usage_store()
        .count(&base_filter)
        .map_err(|e| storage_error("count", e))?;

    Ok(Json(UsageQueryResponse {
        records,
        total,
        limit,
        offset,
    }))
}
