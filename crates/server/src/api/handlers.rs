use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use genloom_core::{SanitizedConfig, ToolKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// A registered provider adapter.
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub tool_kind: ToolKind,
    /// Whether this adapter is the default for its tool kind
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let registry = state.orchestrator().registry();
    let providers = registry
        .ids()
        .into_iter()
        .filter_map(|id| registry.get(&id))
        .map(|adapter| {
            let kind = adapter.tool_kind();
            let id = adapter.provider_id().to_string();
            let is_default = registry
                .default_for(kind)
                .is_some_and(|d| d.provider_id() == id);
            ProviderInfo {
                id,
                tool_kind: kind,
                is_default,
            }
        })
        .collect();
    Json(ProvidersResponse { providers })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    collect_dynamic_metrics(&state).await;
    match encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
