//! Sequential pipeline execution with pause/resume.
//!
//! The orchestrator walks a pipeline's stages in order, dispatching each to
//! the executor registered for its type. Run state is persisted at every
//! transition, so a run that pauses in `waiting` can be approved and resumed
//! after a process restart. Resume continues from the stage following the
//! paused one.

use crate::error::{Result, ServerError};
use crate::pipeline::{
    Pipeline, PipelineRun, RunStatus, StageExecutor, StageOutcome, StageResult, StageStatus,
};
use crate::repo::{PipelineRepository, PipelineRunRepository};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Sequential stage machine over the workflow service.
pub struct PipelineOrchestrator {
    pipelines: Arc<dyn PipelineRepository>,
    runs: Arc<dyn PipelineRunRepository>,
    executors: HashMap<String, Arc<dyn StageExecutor>>,
}

impl PipelineOrchestrator {
    pub fn new(
        pipelines: Arc<dyn PipelineRepository>,
        runs: Arc<dyn PipelineRunRepository>,
    ) -> Self {
        Self {
            pipelines,
            runs,
            executors: HashMap::new(),
        }
    }

    /// Register an executor for a stage type. Adding a stage type is one
    /// implementation plus one registration; there is no central switch.
    pub fn register(&mut self, kind: impl Into<String>, executor: Arc<dyn StageExecutor>) {
        self.executors.insert(kind.into(), executor);
    }

    /// Start a fresh run of a pipeline and execute until it completes,
    /// fails, or pauses in `waiting`.
    pub async fn start(&self, pipeline_id: &str) -> Result<PipelineRun> {
        let pipeline = self.load_pipeline(pipeline_id).await?;
        let mut run = PipelineRun::new(&pipeline);
        self.runs.create(&run).await?;
        info!(pipeline = %pipeline.id, run = %run.id, "pipeline run started");

        self.execute_from(&pipeline, &mut run, 0).await?;
        Ok(run)
    }

    /// Approve a waiting run. The waiting stage completes and the run
    /// resumes in a background task from the following stage, so the caller
    /// gets an immediate acknowledgement.
    pub async fn approve(self: &Arc<Self>, pipeline_id: &str, run_id: &str) -> Result<PipelineRun> {
        let pipeline = self.load_pipeline(pipeline_id).await?;
        let mut run = self.load_run(&pipeline, run_id).await?;
        if run.status != RunStatus::Waiting {
            return Err(ServerError::InvalidRequest(
                "run is not waiting for approval".to_string(),
            ));
        }
        let index = pipeline.stage_index(&run.current_stage).ok_or_else(|| {
            ServerError::InvalidRequest(format!(
                "current stage '{}' is not part of pipeline '{}'",
                run.current_stage, pipeline.id
            ))
        })?;

        if let Some(result) = run.stage_results.get_mut(&run.current_stage) {
            result.status = StageStatus::Completed;
            result.completed_at = Some(Utc::now());
        }
        run.status = RunStatus::Running;
        self.runs.update(&run).await?;
        info!(run = %run.id, stage = %run.current_stage, "run approved, resuming");

        let orchestrator = Arc::clone(self);
        let mut resume_run = run.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator
                .execute_from(&pipeline, &mut resume_run, index + 1)
                .await
            {
                error!(run = %resume_run.id, %err, "pipeline resume failed");
            }
        });

        Ok(run)
    }

    /// Reject a waiting run: the waiting stage and the run both fail with
    /// "rejected by user".
    pub async fn reject(&self, pipeline_id: &str, run_id: &str) -> Result<PipelineRun> {
        let pipeline = self.load_pipeline(pipeline_id).await?;
        let mut run = self.load_run(&pipeline, run_id).await?;
        if run.status != RunStatus::Waiting {
            return Err(ServerError::InvalidRequest(
                "run is not waiting for approval".to_string(),
            ));
        }

        let message = ServerError::RejectedByUser.to_string();
        let now = Utc::now();
        let result = run
            .stage_results
            .entry(run.current_stage.clone())
            .or_insert_with(|| StageResult {
                status: StageStatus::Waiting,
                output: None,
                error: None,
                started_at: Some(now),
                completed_at: None,
            });
        result.status = StageStatus::Failed;
        result.error = Some(message.clone());
        result.completed_at = Some(now);

        run.status = RunStatus::Failed;
        run.completed_at = Some(now);
        self.runs.update(&run).await?;
        info!(run = %run.id, "run rejected");
        Ok(run)
    }

    /// Execute stages from `start_index` onward, persisting the run at every
    /// state transition.
    async fn execute_from(
        &self,
        pipeline: &Pipeline,
        run: &mut PipelineRun,
        start_index: usize,
    ) -> Result<()> {
        run.status = RunStatus::Running;
        self.runs.update(run).await?;

        for index in start_index..pipeline.stages.len() {
            let stage = &pipeline.stages[index];
            run.current_stage = stage.id.clone();
            self.runs.update(run).await?;

            let seed = latest_completed_before(pipeline, run, index);
            let started_at = Utc::now();

            let Some(executor) = self.executors.get(&stage.kind) else {
                let message = ServerError::UnknownStageType(stage.kind.clone()).to_string();
                return self.fail_run(run, &stage.id, message, started_at).await;
            };

            let outcome = match executor.execute(stage, seed.as_ref()).await {
                Ok(outcome) => outcome,
                Err(err) => StageOutcome::failed(err.to_string()),
            };

            match outcome.status {
                StageStatus::Completed | StageStatus::Skipped => {
                    run.stage_results.insert(
                        stage.id.clone(),
                        StageResult {
                            status: outcome.status,
                            output: outcome.output,
                            error: None,
                            started_at: Some(started_at),
                            completed_at: Some(Utc::now()),
                        },
                    );
                    self.runs.update(run).await?;
                }
                StageStatus::Waiting => {
                    run.stage_results.insert(
                        stage.id.clone(),
                        StageResult {
                            status: StageStatus::Waiting,
                            output: outcome.output,
                            error: None,
                            started_at: Some(started_at),
                            completed_at: None,
                        },
                    );
                    run.status = RunStatus::Waiting;
                    self.runs.update(run).await?;
                    info!(run = %run.id, stage = %stage.id, "run paused");
                    return Ok(());
                }
                StageStatus::Failed => {
                    let message = outcome
                        .error
                        .unwrap_or_else(|| "stage failed".to_string());
                    return self.fail_run(run, &stage.id, message, started_at).await;
                }
            }
        }

        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        self.runs.update(run).await?;
        info!(run = %run.id, "run completed");
        Ok(())
    }

    async fn fail_run(
        &self,
        run: &mut PipelineRun,
        stage_id: &str,
        message: String,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        error!(run = %run.id, stage = %stage_id, %message, "stage failed");
        run.stage_results.insert(
            stage_id.to_string(),
            StageResult {
                status: StageStatus::Failed,
                output: None,
                error: Some(message),
                started_at: Some(started_at),
                completed_at: Some(Utc::now()),
            },
        );
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        self.runs.update(run).await?;
        Ok(())
    }

    async fn load_pipeline(&self, pipeline_id: &str) -> Result<Pipeline> {
        self.pipelines
            .get(pipeline_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("pipeline '{}'", pipeline_id)))
    }

    async fn load_run(&self, pipeline: &Pipeline, run_id: &str) -> Result<PipelineRun> {
        let run = self
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("run '{}'", run_id)))?;
        if run.pipeline_id != pipeline.id {
            return Err(ServerError::NotFound(format!(
                "run '{}' does not belong to pipeline '{}'",
                run_id, pipeline.id
            )));
        }
        Ok(run)
    }
}

/// The most recent stage with a completed result strictly before `index`,
/// in pipeline order.
fn latest_completed_before(
    pipeline: &Pipeline,
    run: &PipelineRun,
    index: usize,
) -> Option<StageResult> {
    pipeline.stages[..index].iter().rev().find_map(|stage| {
        run.stage_results
            .get(&stage.id)
            .filter(|r| r.status == StageStatus::Completed)
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ApprovalStageExecutor, PipelineStage};
    use crate::repo::{MemoryPipelineRepository, MemoryPipelineRunRepository};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Records every stage id it executes; completes with a fixed output.
    struct RecordingExecutor {
        invocations: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StageExecutor for RecordingExecutor {
        async fn execute(
            &self,
            stage: &PipelineStage,
            previous: Option<&StageResult>,
        ) -> Result<StageOutcome> {
            self.invocations.lock().push(stage.id.clone());
            Ok(StageOutcome::completed(json!({
                "stage": stage.id,
                "seed": previous.and_then(|p| p.output.clone()),
            })))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl StageExecutor for FailingExecutor {
        async fn execute(
            &self,
            _stage: &PipelineStage,
            _previous: Option<&StageResult>,
        ) -> Result<StageOutcome> {
            Ok(StageOutcome::failed("exploded"))
        }
    }

    struct Setup {
        orchestrator: Arc<PipelineOrchestrator>,
        runs: Arc<MemoryPipelineRunRepository>,
        pipeline: Pipeline,
        invocations: Arc<Mutex<Vec<String>>>,
    }

    async fn setup(stages: Vec<PipelineStage>) -> Setup {
        let pipelines = Arc::new(MemoryPipelineRepository::new());
        let runs = Arc::new(MemoryPipelineRunRepository::new());
        let pipeline = Pipeline::new("digest", stages);
        use crate::repo::PipelineRepository as _;
        pipelines.create(&pipeline).await.unwrap();

        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut orchestrator = PipelineOrchestrator::new(
            Arc::clone(&pipelines) as _,
            Arc::clone(&runs) as _,
        );
        orchestrator.register(
            "workflow",
            Arc::new(RecordingExecutor {
                invocations: Arc::clone(&invocations),
            }),
        );
        orchestrator.register("approval", Arc::new(ApprovalStageExecutor));
        orchestrator.register("boom", Arc::new(FailingExecutor));

        Setup {
            orchestrator: Arc::new(orchestrator),
            runs,
            pipeline,
            invocations,
        }
    }

    fn approval_pipeline_stages() -> Vec<PipelineStage> {
        vec![
            PipelineStage::new("collect", "workflow", json!({"workflow_name": "collect"})),
            PipelineStage::new("pick", "approval", json!({"message": "review items"})),
            PipelineStage::new("publish", "workflow", json!({"workflow_name": "publish"})),
        ]
    }

    async fn wait_for_terminal(
        runs: &MemoryPipelineRunRepository,
        run_id: &str,
    ) -> PipelineRun {
        use crate::repo::PipelineRunRepository as _;
        for _ in 0..100 {
            let run = runs.get(run_id).await.unwrap().unwrap();
            if matches!(run.status, RunStatus::Completed | RunStatus::Failed) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {} never reached a terminal state", run_id);
    }

    #[tokio::test]
    async fn test_start_pauses_at_approval() {
        let s = setup(approval_pipeline_stages()).await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();

        assert_eq!(run.status, RunStatus::Waiting);
        assert_eq!(run.current_stage, "pick");
        assert_eq!(run.stage_results["collect"].status, StageStatus::Completed);
        assert_eq!(run.stage_results["pick"].status, StageStatus::Waiting);
        assert!(run.stage_results["pick"].completed_at.is_none());
        assert!(run.completed_at.is_none());
        assert_eq!(*s.invocations.lock(), vec!["collect".to_string()]);
    }

    #[tokio::test]
    async fn test_approve_resumes_from_next_stage() {
        let s = setup(approval_pipeline_stages()).await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();

        let acknowledged = s
            .orchestrator
            .approve(&s.pipeline.id, &run.id)
            .await
            .unwrap();
        assert_eq!(acknowledged.status, RunStatus::Running);

        let finished = wait_for_terminal(&s.runs, &run.id).await;
        assert_eq!(finished.status, RunStatus::Completed);
        assert!(finished.completed_at.is_some());
        for stage in ["collect", "pick", "publish"] {
            let result = &finished.stage_results[stage];
            assert_eq!(result.status, StageStatus::Completed, "{}", stage);
            assert!(result.completed_at.is_some(), "{}", stage);
        }

        // publish ran exactly once, collect was not re-executed.
        assert_eq!(
            *s.invocations.lock(),
            vec!["collect".to_string(), "publish".to_string()]
        );
    }

    #[tokio::test]
    async fn test_resume_seed_is_latest_completed_stage() {
        let s = setup(approval_pipeline_stages()).await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();
        s.orchestrator
            .approve(&s.pipeline.id, &run.id)
            .await
            .unwrap();
        let finished = wait_for_terminal(&s.runs, &run.id).await;

        // publish saw the approved pick stage (completed, message payload),
        // which is the most recent completed stage before it.
        let publish_output = finished.stage_results["publish"]
            .output
            .as_ref()
            .unwrap();
        assert_eq!(publish_output["seed"]["message"], "review items");
    }

    #[tokio::test]
    async fn test_approve_non_waiting_run_rejected() {
        let s = setup(vec![PipelineStage::new(
            "only",
            "workflow",
            json!({"workflow_name": "only"}),
        )])
        .await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let err = s
            .orchestrator
            .approve(&s.pipeline.id, &run.id)
            .await
            .unwrap_err();
        match err {
            ServerError::InvalidRequest(message) => {
                assert_eq!(message, "run is not waiting for approval")
            }
            other => panic!("unexpected error {:?}", other),
        }

        // State unchanged.
        use crate::repo::PipelineRunRepository as _;
        let reloaded = s.runs.get(&run.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_reject_fails_run_and_stage() {
        let s = setup(approval_pipeline_stages()).await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();

        let rejected = s
            .orchestrator
            .reject(&s.pipeline.id, &run.id)
            .await
            .unwrap();
        assert_eq!(rejected.status, RunStatus::Failed);
        let pick = &rejected.stage_results["pick"];
        assert_eq!(pick.status, StageStatus::Failed);
        assert_eq!(pick.error.as_deref(), Some("rejected by user"));
        assert!(rejected.completed_at.is_some());

        // publish never ran.
        assert_eq!(*s.invocations.lock(), vec!["collect".to_string()]);
    }

    #[tokio::test]
    async fn test_stage_failure_fails_run() {
        let s = setup(vec![
            PipelineStage::new("a", "workflow", json!({"workflow_name": "a"})),
            PipelineStage::new("b", "boom", json!({})),
            PipelineStage::new("c", "workflow", json!({"workflow_name": "c"})),
        ])
        .await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.stage_results["b"].status, StageStatus::Failed);
        assert!(run.stage_results["b"].error.as_deref().unwrap().contains("exploded"));
        assert!(!run.stage_results.contains_key("c"));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_stage_type_fails_run() {
        let s = setup(vec![PipelineStage::new("weird", "quantum", json!({}))]).await;
        let run = s.orchestrator.start(&s.pipeline.id).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.stage_results["weird"]
            .error
            .as_deref()
            .unwrap()
            .contains("unknown stage type"));
    }
}
