//! Trellis server: HTTP surface, pipeline orchestration, and persistence
//! over the workflow execution engine.
//!
//! - [`service`] - the workflow front door (resolve, execute, classify, SSE)
//! - [`pipeline`] - sequential stage machine with approvals and resume
//! - [`repo`] - workflow/pipeline/run stores (memory, sqlite, two-tier)
//! - [`api`] - axum handlers
//! - [`config`] - flat TOML configuration and provider wiring

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod repo;
pub mod service;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use service::WorkflowService;

use crate::api::AppState;
use crate::pipeline::{
    ApprovalStageExecutor, PipelineOrchestrator, TransformStageExecutor, WaitingStageExecutor,
    WorkflowStageExecutor,
};
use crate::repo::{
    Database, DurablePipelineRepository, DurablePipelineRunRepository, DurableWorkflowRepository,
    MemoryPipelineRepository, MemoryPipelineRunRepository, MemoryWorkflowRepository,
    PipelineRepository, PipelineRunRepository, TieredPipelineRepository,
    TieredPipelineRunRepository, TieredWorkflowRepository, WorkflowRepository,
};
use engine::tool::ToolRegistry;
use engine::EventBus;
use llm::ProviderRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wire the whole application from configuration: repositories (with the
/// durable tier when configured and reachable), providers, tools, the
/// workflow service, and the pipeline orchestrator.
pub async fn bootstrap(config: &ServerConfig) -> Result<axum::Router> {
    let memory_workflows = Arc::new(MemoryWorkflowRepository::new());
    let memory_pipelines = Arc::new(MemoryPipelineRepository::new());
    let memory_runs = Arc::new(MemoryPipelineRunRepository::new());

    let (workflows, pipelines, runs): (
        Arc<dyn WorkflowRepository>,
        Arc<dyn PipelineRepository>,
        Arc<dyn PipelineRunRepository>,
    ) = match &config.database_path {
        Some(path) => match Database::connect(path).await {
            Ok(db) => {
                let db = Arc::new(db);
                (
                    Arc::new(TieredWorkflowRepository::new(
                        memory_workflows,
                        Arc::new(DurableWorkflowRepository::new(Arc::clone(&db))),
                    )),
                    Arc::new(TieredPipelineRepository::new(
                        memory_pipelines,
                        Arc::new(DurablePipelineRepository::new(Arc::clone(&db))),
                    )),
                    Arc::new(TieredPipelineRunRepository::new(
                        memory_runs,
                        Arc::new(DurablePipelineRunRepository::new(db)),
                    )),
                )
            }
            Err(err) => {
                // The product stays usable without durability.
                warn!(%err, "durable store unavailable, running memory-only");
                (memory_workflows, memory_pipelines, memory_runs)
            }
        },
        None => (memory_workflows, memory_pipelines, memory_runs),
    };

    let registry = ProviderRegistry::with_builtins();
    let providers = config.build_providers(&registry)?;

    let mut tools = ToolRegistry::new();
    tooling::register_builtin_tools(&mut tools, &tooling::ContentStore::new());
    let tools = Arc::new(tools);

    let bus = EventBus::new();
    spawn_event_logger(&bus);

    let service = Arc::new(WorkflowService::new(
        Arc::clone(&workflows),
        providers,
        tools,
        bus,
    ));

    let mut orchestrator =
        PipelineOrchestrator::new(Arc::clone(&pipelines), Arc::clone(&runs));
    orchestrator.register(
        "workflow",
        Arc::new(WorkflowStageExecutor::new(Arc::clone(&service))),
    );
    orchestrator.register("approval", Arc::new(ApprovalStageExecutor));
    orchestrator.register("transform", Arc::new(TransformStageExecutor));
    orchestrator.register("schedule", Arc::new(WaitingStageExecutor::schedule()));
    orchestrator.register("trigger", Arc::new(WaitingStageExecutor::trigger()));

    let state = AppState {
        service,
        workflows,
        pipelines,
        runs,
        orchestrator: Arc::new(orchestrator),
    };
    Ok(api::router(state))
}

/// Drain one bus subscription into the log, so operators see run activity
/// even with no SSE client attached.
fn spawn_event_logger(bus: &EventBus) {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            debug!(
                kind = event.kind(),
                node = event.node_id().unwrap_or("-"),
                "execution event"
            );
        }
    });
}
