//! Concurrent DAG execution.
//!
//! Every node runs on its own task. A per-node "done gate" (a watch channel
//! flipped once) expresses parents-before-children without a central lock:
//! workers await their parents' gates, run their agent, then open their own
//! gate. Failure is propagated through a shared cancellation token plus a
//! once-only error cell; cancelled nodes emit no events.

use crate::agents::{NodeAgent, RunContext};
use crate::dag::Dag;
use crate::definition::WorkflowDefinition;
use crate::error::{EngineError, Result};
use crate::events::ExecutionEvent;
use crate::session::Session;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Buffer between node workers and the run's single event consumer.
const RUN_EVENT_BUFFER: usize = 256;

/// A started workflow run: its id, session, and the multiplexed event
/// stream. The stream ends after the terminal `done` event.
#[derive(Debug)]
pub struct RunHandle {
    pub session_id: String,
    pub session: Session,
    pub events: ReceiverStream<ExecutionEvent>,
}

/// Runs node agents concurrently, honoring parent -> child dependencies.
pub struct DagScheduler {
    agents: HashMap<String, Arc<dyn NodeAgent>>,
}

impl DagScheduler {
    pub fn new(agents: HashMap<String, Arc<dyn NodeAgent>>) -> Self {
        Self { agents }
    }

    /// Start a run.
    ///
    /// Definition-level failures (invalid structure, cycle, missing agent)
    /// are returned here, before any event is emitted. Everything after this
    /// point is reported through the event stream, which always terminates
    /// with a `done` event.
    pub fn execute(
        &self,
        definition: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<RunHandle> {
        let dag = Dag::build(definition)?;
        for id in dag.topological_order() {
            if !self.agents.contains_key(id) {
                return Err(EngineError::InvalidDefinition(format!(
                    "no agent constructed for node '{}'",
                    id
                )));
            }
        }

        let session = Session::with_user_inputs(&inputs);
        let session_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel::<ExecutionEvent>(RUN_EVENT_BUFFER);
        let error_cell: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let scope = cancel.child_token();

        // One gate per node, flipped to true exactly once.
        let mut gates: HashMap<String, watch::Sender<bool>> = HashMap::new();
        let mut gate_readers: HashMap<String, watch::Receiver<bool>> = HashMap::new();
        for id in dag.topological_order() {
            let (gate_tx, gate_rx) = watch::channel(false);
            gates.insert(id.clone(), gate_tx);
            gate_readers.insert(id.clone(), gate_rx);
        }

        let mut workers = JoinSet::new();
        for id in dag.topological_order() {
            let agent = Arc::clone(&self.agents[id]);
            let parent_gates: Vec<watch::Receiver<bool>> = dag
                .parents(id)
                .iter()
                .map(|p| gate_readers[p].clone())
                .collect();
            let gate = gates.remove(id).expect("one gate per node");
            workers.spawn(run_node(
                id.clone(),
                agent,
                parent_gates,
                gate,
                session.clone(),
                tx.clone(),
                Arc::clone(&error_cell),
                scope.clone(),
            ));
        }
        drop(gate_readers);

        let supervisor_session = session.clone();
        let supervisor_id = session_id.clone();
        tokio::spawn(async move {
            while workers.join_next().await.is_some() {}

            let failure = error_cell.lock().take();
            let terminal = match failure {
                Some(message) => ExecutionEvent::done_failed(&supervisor_id, message),
                None if scope.is_cancelled() => ExecutionEvent::done_failed(
                    &supervisor_id,
                    EngineError::Cancelled("run cancelled by caller".to_string()).to_string(),
                ),
                None => ExecutionEvent::done_completed(
                    &supervisor_id,
                    supervisor_session.snapshot(),
                ),
            };
            let _ = tx.send(terminal).await;
        });

        Ok(RunHandle {
            session_id,
            session,
            events: ReceiverStream::new(rx),
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_node(
    node_id: String,
    agent: Arc<dyn NodeAgent>,
    parent_gates: Vec<watch::Receiver<bool>>,
    gate: watch::Sender<bool>,
    session: Session,
    tx: mpsc::Sender<ExecutionEvent>,
    error_cell: Arc<Mutex<Option<String>>>,
    scope: CancellationToken,
) {
    // Await every parent's gate, or bail on cancellation.
    for mut parent in parent_gates {
        tokio::select! {
            _ = scope.cancelled() => return,
            opened = parent.wait_for(|done| *done) => {
                if opened.is_err() {
                    // Parent exited without opening its gate.
                    return;
                }
            }
        }
    }

    // A parent may have opened its gate on the failure path; the
    // cancellation flag is already visible by then.
    if scope.is_cancelled() {
        let _ = gate.send(true);
        return;
    }

    debug!(node = %node_id, "node starting");
    let ctx = RunContext::new(scope.clone());
    let mut events = agent.run(&ctx, &session);

    loop {
        tokio::select! {
            _ = scope.cancelled() => {
                // Cancelled mid-run: initiate no further work, emit nothing.
                return;
            }
            item = events.next() => match item {
                None => break,
                Some(Ok(event)) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Some(Err(err)) => {
                    error!(node = %node_id, %err, "node failed");
                    {
                        let mut cell = error_cell.lock();
                        if cell.is_none() {
                            *cell = Some(err.to_string());
                        }
                    }
                    let _ = tx
                        .send(ExecutionEvent::node_error(&node_id, err.to_string()))
                        .await;
                    // Cancel before opening the gate: a child released by
                    // this gate must already observe the failure.
                    scope.cancel();
                    let _ = gate.send(true);
                    return;
                }
            }
        }
    }

    drop(events);
    let _ = gate.send(true);
}
