//! Workflow CRUD and run streaming handlers.

use crate::api::AppState;
use crate::error::{Result, ServerError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use engine::{Dag, ExecutionEvent, WorkflowDefinition};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;

/// Request body for `POST /workflows/{name}/run`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
}

/// `POST /workflows` - create a workflow definition.
pub async fn create(
    State(state): State<AppState>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<WorkflowDefinition>)> {
    // Reject structurally invalid definitions up front.
    Dag::build(&definition)?;
    state.workflows.create(&definition).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// `GET /workflows` - list workflow definitions.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.workflows.list().await?))
}

/// `GET /workflows/{name}`.
pub async fn get_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<WorkflowDefinition>> {
    state
        .workflows
        .get(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("workflow '{}'", name)))
}

/// `PUT /workflows/{name}`.
pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut definition): Json<WorkflowDefinition>,
) -> Result<Json<WorkflowDefinition>> {
    definition.name = name;
    Dag::build(&definition)?;
    state.workflows.update(&definition).await?;
    Ok(Json(definition))
}

/// `DELETE /workflows/{name}`.
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    state.workflows.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /workflows/{name}/run` - execute and stream events.
///
/// Each event is written as `event: <kind>` / `data: <json>` followed by a
/// blank line; the terminal event is always `done`.
pub async fn run(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RunRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = state.service.run(name, request.inputs);
    let frames = events.map(|event: ExecutionEvent| {
        Ok(Event::default()
            .event(event.kind())
            .data(event.payload().to_string()))
    });
    Sse::new(frames).keep_alive(KeepAlive::default())
}
