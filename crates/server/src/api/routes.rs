use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::{handlers, middleware::metrics_middleware, stages, usage};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/providers", get(handlers::list_providers))
        // Stages
        .route("/entities/{id}/stages/base", post(stages::start_base))
        .route("/entities/{id}/stages/derived", post(stages::start_derived))
        .route("/entities/{id}/resume", post(stages::resume))
        .route("/entities/{id}/task", get(stages::get_task))
        .route("/entities/{id}/tasks", get(stages::list_tasks))
        // Usage log
        .route("/usage", get(usage::query_usage));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
}
