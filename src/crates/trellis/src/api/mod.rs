//! HTTP surface.
//!
//! Thin axum handlers over the workflow service, the pipeline orchestrator,
//! and the repositories. Workflow runs stream as server-sent events; every
//! other endpoint is plain JSON.

mod pipelines;
mod workflows;

use crate::error::ServerError;
use crate::pipeline::PipelineOrchestrator;
use crate::repo::{PipelineRepository, PipelineRunRepository, WorkflowRepository};
use crate::service::WorkflowService;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub pipelines: Arc<dyn PipelineRepository>,
    pub runs: Arc<dyn PipelineRunRepository>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows", post(workflows::create).get(workflows::list))
        .route(
            "/workflows/:name",
            get(workflows::get_one)
                .put(workflows::update)
                .delete(workflows::delete),
        )
        .route("/workflows/:name/run", post(workflows::run))
        .route("/pipelines", post(pipelines::create).get(pipelines::list))
        .route(
            "/pipelines/:id",
            get(pipelines::get_one)
                .put(pipelines::update)
                .delete(pipelines::delete),
        )
        .route("/pipelines/:id/start", post(pipelines::start))
        .route("/pipelines/:id/runs", get(pipelines::list_runs))
        .route(
            "/pipelines/:id/runs/:run_id/approve",
            post(pipelines::approve),
        )
        .route(
            "/pipelines/:id/runs/:run_id/reject",
            post(pipelines::reject),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_)
            | ServerError::UnknownStageType(_)
            | ServerError::RejectedByUser => StatusCode::BAD_REQUEST,
            ServerError::Engine(err) if err.is_definition_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let not_found = ServerError::NotFound("x".to_string()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = ServerError::InvalidRequest("bad".to_string()).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let definition = ServerError::Engine(engine::EngineError::InvalidDefinition(
            "dup".to_string(),
        ))
        .into_response();
        assert_eq!(definition.status(), StatusCode::BAD_REQUEST);

        let database = ServerError::Database("down".to_string()).into_response();
        assert_eq!(database.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
