//! Stage executors.
//!
//! Each pipeline stage type is a single-method strategy registered in the
//! orchestrator's executor table. Executors receive the stage definition and
//! the seed result (the most recent completed stage) and report one of
//! {completed, waiting, failed}.

use crate::error::Result;
use crate::pipeline::{PipelineStage, StageResult, StageStatus};
use crate::service::WorkflowService;
use async_trait::async_trait;
use engine::ExecutionEvent;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one stage execution, before the orchestrator stamps
/// timestamps.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn completed(output: Value) -> Self {
        Self {
            status: StageStatus::Completed,
            output: Some(output),
            error: None,
        }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Waiting,
            output: Some(json!({"message": message.into()})),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// A registered strategy for one stage type.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Execute the stage. `previous` is the result of the most recent
    /// completed stage before this one, if any.
    async fn execute(
        &self,
        stage: &PipelineStage,
        previous: Option<&StageResult>,
    ) -> Result<StageOutcome>;
}

/// Project a previous stage's output object through an `input_mapping`
/// (target key -> source key). Missing source keys are silently omitted.
/// Without a mapping, an object output passes through unchanged.
fn project_mapping(previous: Option<&Value>, mapping: Option<&Value>) -> Map<String, Value> {
    let source = previous.and_then(|v| v.as_object());
    match mapping.and_then(|m| m.as_object()) {
        Some(mapping) => {
            let mut projected = Map::new();
            if let Some(source) = source {
                for (target, source_key) in mapping {
                    let Some(source_key) = source_key.as_str() else {
                        continue;
                    };
                    if let Some(value) = source.get(source_key) {
                        projected.insert(target.clone(), value.clone());
                    }
                }
            }
            projected
        }
        None => source.cloned().unwrap_or_default(),
    }
}

/// Runs a named workflow and stores its terminal session snapshot.
pub struct WorkflowStageExecutor {
    service: Arc<WorkflowService>,
}

impl WorkflowStageExecutor {
    pub fn new(service: Arc<WorkflowService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StageExecutor for WorkflowStageExecutor {
    async fn execute(
        &self,
        stage: &PipelineStage,
        previous: Option<&StageResult>,
    ) -> Result<StageOutcome> {
        let Some(workflow_name) = stage.config_str("workflow_name") else {
            return Ok(StageOutcome::failed(format!(
                "workflow stage '{}' names no workflow_name",
                stage.id
            )));
        };

        let inputs: HashMap<String, Value> = project_mapping(
            previous.and_then(|p| p.output.as_ref()),
            stage.config.get("input_mapping"),
        )
        .into_iter()
        .collect();

        debug!(stage = %stage.id, workflow = workflow_name, inputs = inputs.len(), "running workflow stage");

        let mut events = self.service.run(workflow_name.to_string(), inputs);
        while let Some(event) = events.next().await {
            if let ExecutionEvent::Done {
                status,
                state,
                error,
                ..
            } = event
            {
                return Ok(if status == "completed" {
                    StageOutcome::completed(json!(state.unwrap_or_default()))
                } else {
                    StageOutcome::failed(
                        error.unwrap_or_else(|| "workflow failed".to_string()),
                    )
                });
            }
        }
        Ok(StageOutcome::failed(
            "workflow stream ended without a terminal event".to_string(),
        ))
    }
}

/// Returns `waiting` immediately; the run pauses until approved or rejected.
pub struct ApprovalStageExecutor;

#[async_trait]
impl StageExecutor for ApprovalStageExecutor {
    async fn execute(
        &self,
        stage: &PipelineStage,
        _previous: Option<&StageResult>,
    ) -> Result<StageOutcome> {
        let message = stage
            .config_str("message")
            .unwrap_or("waiting for approval");
        Ok(StageOutcome::waiting(message))
    }
}

/// Pure data projection from the previous result.
pub struct TransformStageExecutor;

#[async_trait]
impl StageExecutor for TransformStageExecutor {
    async fn execute(
        &self,
        stage: &PipelineStage,
        previous: Option<&StageResult>,
    ) -> Result<StageOutcome> {
        let projected = project_mapping(
            previous.and_then(|p| p.output.as_ref()),
            stage.config.get("input_mapping"),
        );
        Ok(StageOutcome::completed(Value::Object(projected)))
    }
}

/// Placeholder for schedule and trigger stages: registers intent and waits
/// for an external source to fire (via approve).
pub struct WaitingStageExecutor {
    kind: &'static str,
}

impl WaitingStageExecutor {
    pub fn schedule() -> Self {
        Self { kind: "schedule" }
    }

    pub fn trigger() -> Self {
        Self { kind: "trigger" }
    }
}

#[async_trait]
impl StageExecutor for WaitingStageExecutor {
    async fn execute(
        &self,
        stage: &PipelineStage,
        _previous: Option<&StageResult>,
    ) -> Result<StageOutcome> {
        Ok(StageOutcome::waiting(format!(
            "{} stage '{}' registered, waiting to fire",
            self.kind, stage.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_mapping_selects_and_omits() {
        let previous = json!({"summary": "text", "score": 7});
        let mapping = json!({"input_text": "summary", "missing": "not_there"});

        let projected = project_mapping(Some(&previous), Some(&mapping));
        assert_eq!(projected.len(), 1);
        assert_eq!(projected["input_text"], "text");
    }

    #[test]
    fn test_project_mapping_pass_through_without_mapping() {
        let previous = json!({"a": 1});
        let projected = project_mapping(Some(&previous), None);
        assert_eq!(projected["a"], 1);
    }

    #[test]
    fn test_project_mapping_no_previous() {
        assert!(project_mapping(None, Some(&json!({"x": "y"}))).is_empty());
        assert!(project_mapping(None, None).is_empty());
    }

    #[tokio::test]
    async fn test_approval_waits() {
        let stage = PipelineStage::new("pick", "approval", json!({"message": "choose one"}));
        let outcome = ApprovalStageExecutor
            .execute(&stage, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, StageStatus::Waiting);
        assert_eq!(outcome.output.unwrap()["message"], "choose one");
    }

    #[tokio::test]
    async fn test_transform_projects() {
        let stage = PipelineStage::new(
            "shape",
            "transform",
            json!({"input_mapping": {"text": "summary"}}),
        );
        let previous = StageResult {
            status: StageStatus::Completed,
            output: Some(json!({"summary": "hello"})),
            error: None,
            started_at: None,
            completed_at: None,
        };
        let outcome = TransformStageExecutor
            .execute(&stage, Some(&previous))
            .await
            .unwrap();
        assert_eq!(outcome.output.unwrap(), json!({"text": "hello"}));
    }

    #[tokio::test]
    async fn test_schedule_waits() {
        let stage = PipelineStage::new("nightly", "schedule", json!({"cron": "0 2 * * *"}));
        let outcome = WaitingStageExecutor::schedule()
            .execute(&stage, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, StageStatus::Waiting);
    }
}
