//! Pipelines: sequential stage machines layered over workflow runs.
//!
//! A pipeline chains typed stages (workflow, approval, transform, schedule,
//! trigger). Runs are durable: a waiting run survives process restarts and
//! resumes from the stage after the one that paused it.

mod orchestrator;
mod stages;

pub use orchestrator::PipelineOrchestrator;
pub use stages::{
    ApprovalStageExecutor, StageExecutor, StageOutcome, TransformStageExecutor,
    WaitingStageExecutor, WorkflowStageExecutor,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<PipelineStage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Create a pipeline with a fresh id and current timestamps.
    pub fn new(name: impl Into<String>, stages: Vec<PipelineStage>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            stages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Position of a stage in the pipeline's order.
    pub fn stage_index(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == stage_id)
    }
}

/// One typed step inside a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: String,
    pub name: String,
    /// Stage type tag; dispatched through the executor table.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl PipelineStage {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, config: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: kind.into(),
            config,
        }
    }

    /// Read a string-valued configuration key.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Waiting => "waiting",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Status of a single stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Waiting,
    Failed,
    Skipped,
}

/// Result of one stage execution within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One execution of a pipeline. Durable across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub pipeline_id: String,
    pub status: RunStatus,
    /// The single stage currently owning the run.
    pub current_stage: String,
    #[serde(default)]
    pub stage_results: HashMap<String, StageResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a fresh pending run for a pipeline.
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pipeline_id: pipeline.id.clone(),
            status: RunStatus::Pending,
            current_stage: pipeline
                .stages
                .first()
                .map(|s| s.id.clone())
                .unwrap_or_default(),
            stage_results: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pipeline_round_trip() {
        let pipeline = Pipeline::new(
            "daily-digest",
            vec![
                PipelineStage::new("collect", "workflow", json!({"workflow_name": "collect"})),
                PipelineStage::new("pick", "approval", json!({"message": "review"})),
            ],
        );

        let value = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(value["stages"][0]["type"], "workflow");

        let back: Pipeline = serde_json::from_value(value).unwrap();
        assert_eq!(back.stages.len(), 2);
        assert_eq!(back.stage_index("pick"), Some(1));
    }

    #[test]
    fn test_new_run_points_at_first_stage() {
        let pipeline = Pipeline::new(
            "p",
            vec![PipelineStage::new("s1", "approval", json!({}))],
        );
        let run = PipelineRun::new(&pipeline);
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.current_stage, "s1");
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_value(RunStatus::Waiting).unwrap(), "waiting");
        assert_eq!(
            serde_json::to_value(StageStatus::Completed).unwrap(),
            "completed"
        );
    }
}
