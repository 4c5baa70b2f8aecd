//! Workflow service: the front door to the execution engine.
//!
//! Resolves a workflow by name through the repository, constructs per-node
//! agents with the configured provider and tool registries, drives the
//! scheduler, and classifies raw engine events into the public taxonomy
//! (stamping wall-clock timestamps on node boundaries). Every public event
//! is also published on the process event bus.

use crate::repo::WorkflowRepository;
use engine::agents;
use engine::provider::Providers;
use engine::tool::ToolRegistry;
use engine::{Dag, DagScheduler, EventBus, ExecutionEvent};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Front door for workflow execution.
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowRepository>,
    providers: Arc<Providers>,
    tools: Arc<ToolRegistry>,
    bus: EventBus,
}

impl WorkflowService {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        providers: Arc<Providers>,
        tools: Arc<ToolRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            workflows,
            providers,
            tools,
            bus,
        }
    }

    /// The process event bus this service publishes to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Execute a workflow by name.
    ///
    /// The returned stream always terminates with a `done` event; failures
    /// before the first node (unknown workflow, invalid definition) produce
    /// an `error` event followed by `done {status: failed}`. Dropping the
    /// stream cancels the run.
    pub fn run(
        self: &Arc<Self>,
        name: String,
        inputs: HashMap<String, Value>,
    ) -> BoxStream<'static, ExecutionEvent> {
        let service = Arc::clone(self);
        Box::pin(async_stream::stream! {
            let definition = match service.workflows.get(&name).await {
                Ok(Some(definition)) => definition,
                Ok(None) => {
                    for event in entry_failure(format!("workflow '{}' not found", name)) {
                        service.bus.publish(&event);
                        yield event;
                    }
                    return;
                }
                Err(err) => {
                    for event in entry_failure(err.to_string()) {
                        service.bus.publish(&event);
                        yield event;
                    }
                    return;
                }
            };

            // Parent lists ordered by topological position, so prompt
            // defaulting is deterministic.
            let dag = match Dag::build(&definition) {
                Ok(dag) => dag,
                Err(err) => {
                    for event in entry_failure(err.to_string()) {
                        service.bus.publish(&event);
                        yield event;
                    }
                    return;
                }
            };
            let position: HashMap<&str, usize> = dag
                .topological_order()
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();

            let mut node_agents = HashMap::new();
            for node in &definition.nodes {
                let mut parents: Vec<String> = dag.parents(&node.id).to_vec();
                parents.sort_by_key(|p| position[p.as_str()]);
                node_agents.insert(
                    node.id.clone(),
                    agents::create(
                        node,
                        parents,
                        Arc::clone(&service.providers),
                        Arc::clone(&service.tools),
                    ),
                );
            }

            // Dropping this stream cancels the run cooperatively.
            let cancel = CancellationToken::new();
            let _cancel_on_drop = cancel.clone().drop_guard();

            let scheduler = DagScheduler::new(node_agents);
            let handle = match scheduler.execute(&definition, inputs, cancel) {
                Ok(handle) => handle,
                Err(err) => {
                    for event in entry_failure(err.to_string()) {
                        service.bus.publish(&event);
                        yield event;
                    }
                    return;
                }
            };

            info!(workflow = %name, session = %handle.session_id, "run started");

            let mut events = handle.events;
            while let Some(event) = events.next().await {
                let event = classify(event);
                service.bus.publish(&event);
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    break;
                }
            }
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Translate a raw engine event into the public vocabulary: stamp node
/// boundary timestamps and derive the state delta a completion implies.
fn classify(event: ExecutionEvent) -> ExecutionEvent {
    match event {
        ExecutionEvent::NodeStarted { node_id, .. } => ExecutionEvent::NodeStarted {
            node_id,
            started_at: Some(now_millis()),
        },
        ExecutionEvent::NodeCompleted {
            node_id,
            output,
            tokens,
            finish_reason,
            ..
        } => {
            let state_delta = Some(json!({ (node_id.clone()): output.clone() }));
            ExecutionEvent::NodeCompleted {
                node_id,
                output,
                state_delta,
                tokens,
                finish_reason,
                completed_at: Some(now_millis()),
            }
        }
        other => other,
    }
}

/// The event pair emitted when a run fails before any node executes.
fn entry_failure(message: String) -> Vec<ExecutionEvent> {
    let session_id = uuid::Uuid::new_v4().to_string();
    vec![
        ExecutionEvent::Error {
            node_id: None,
            message: message.clone(),
        },
        ExecutionEvent::done_failed(session_id, message),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryWorkflowRepository;
    use engine::definition::{NodeDefinition, NodeKind, WorkflowDefinition};

    async fn service_with(definition: Option<WorkflowDefinition>) -> Arc<WorkflowService> {
        let workflows = Arc::new(MemoryWorkflowRepository::new());
        if let Some(definition) = definition {
            use crate::repo::WorkflowRepository as _;
            workflows.create(&definition).await.unwrap();
        }
        Arc::new(WorkflowService::new(
            workflows,
            Arc::new(Providers::new()),
            Arc::new(ToolRegistry::new()),
            EventBus::new(),
        ))
    }

    fn linear() -> WorkflowDefinition {
        WorkflowDefinition::new("linear")
            .with_node(NodeDefinition::new("in", NodeKind::Input))
            .with_node(
                NodeDefinition::new("out", NodeKind::Output)
                    .with_config("display_mode", json!("manual")),
            )
            .with_edge("in", "out")
    }

    #[tokio::test]
    async fn test_linear_run_stamps_timestamps() {
        let service = service_with(Some(linear())).await;
        let mut inputs = HashMap::new();
        inputs.insert("in".to_string(), json!("hello"));

        let events: Vec<ExecutionEvent> =
            service.run("linear".to_string(), inputs).collect().await;

        match &events[0] {
            ExecutionEvent::NodeStarted { started_at, .. } => assert!(started_at.is_some()),
            other => panic!("unexpected first event {:?}", other),
        }
        let completed = events
            .iter()
            .find(|e| e.kind() == "node_completed" && e.node_id() == Some("in"))
            .unwrap();
        match completed {
            ExecutionEvent::NodeCompleted {
                completed_at,
                state_delta,
                ..
            } => {
                assert!(completed_at.is_some());
                assert_eq!(state_delta, &Some(json!({"in": "hello"})));
            }
            other => panic!("unexpected event {:?}", other),
        }

        match events.last().unwrap() {
            ExecutionEvent::Done { status, state, .. } => {
                assert_eq!(status, "completed");
                let state = state.as_ref().unwrap();
                assert_eq!(state["__user_input__in"], json!("hello"));
                assert_eq!(state["out"], json!("hello"));
            }
            other => panic!("unexpected terminal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_workflow_fails_before_any_node() {
        let service = service_with(None).await;
        let events: Vec<ExecutionEvent> = service
            .run("ghost".to_string(), HashMap::new())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "error");
        match &events[1] {
            ExecutionEvent::Done { status, error, .. } => {
                assert_eq!(status, "failed");
                assert!(error.as_ref().unwrap().contains("ghost"));
            }
            other => panic!("unexpected terminal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_definition_surfaces_at_entry() {
        let definition = WorkflowDefinition::new("bad")
            .with_node(NodeDefinition::new("a", NodeKind::Input))
            .with_edge("a", "ghost");
        let service = service_with(Some(definition)).await;

        let events: Vec<ExecutionEvent> =
            service.run("bad".to_string(), HashMap::new()).collect().await;
        assert_eq!(events[0].kind(), "error");
        assert_eq!(events[1].kind(), "done");
    }

    #[tokio::test]
    async fn test_events_published_to_bus() {
        let service = service_with(Some(linear())).await;
        let mut subscription = service.bus().subscribe();

        let mut inputs = HashMap::new();
        inputs.insert("in".to_string(), json!("hi"));
        let _events: Vec<ExecutionEvent> =
            service.run("linear".to_string(), inputs).collect().await;

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.kind(), "node_started");
    }
}
