//! Pipeline CRUD and run lifecycle handlers.

use crate::api::AppState;
use crate::error::{Result, ServerError};
use crate::pipeline::{Pipeline, PipelineRun, PipelineStage, RunStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

/// Request body for creating or updating a pipeline.
#[derive(Debug, Deserialize)]
pub struct PipelineRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<PipelineStage>,
}

/// `POST /pipelines`.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<PipelineRequest>,
) -> Result<(StatusCode, Json<Pipeline>)> {
    let mut pipeline = Pipeline::new(request.name, request.stages);
    pipeline.description = request.description;
    state.pipelines.create(&pipeline).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// `GET /pipelines`.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Pipeline>>> {
    Ok(Json(state.pipelines.list().await?))
}

/// `GET /pipelines/{id}`.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Pipeline>> {
    state
        .pipelines
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("pipeline '{}'", id)))
}

/// `PUT /pipelines/{id}`.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<Pipeline>> {
    let mut pipeline = state
        .pipelines
        .get(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("pipeline '{}'", id)))?;

    pipeline.name = request.name;
    pipeline.description = request.description;
    pipeline.stages = request.stages;
    pipeline.updated_at = Utc::now();
    state.pipelines.update(&pipeline).await?;
    Ok(Json(pipeline))
}

/// `DELETE /pipelines/{id}`.
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.pipelines.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /pipelines/{id}/start`.
///
/// 200 when the run completed immediately, 202 when it is waiting on an
/// approval or schedule, 500 when it failed.
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PipelineRun>)> {
    let run = state.orchestrator.start(&id).await?;
    let status = match run.status {
        RunStatus::Waiting => StatusCode::ACCEPTED,
        RunStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok((status, Json(run)))
}

/// `GET /pipelines/{id}/runs`.
pub async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PipelineRun>>> {
    Ok(Json(state.runs.list_for_pipeline(&id).await?))
}

/// `POST /pipelines/{id}/runs/{run_id}/approve`.
///
/// Returns 202: the resume runs in a background task.
pub async fn approve(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<PipelineRun>)> {
    let run = state.orchestrator.approve(&id, &run_id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// `POST /pipelines/{id}/runs/{run_id}/reject`.
pub async fn reject(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<Json<PipelineRun>> {
    let run = state.orchestrator.reject(&id, &run_id).await?;
    Ok(Json(run))
}
