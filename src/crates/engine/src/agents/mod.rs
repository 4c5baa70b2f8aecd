//! Per-node executors.
//!
//! Every node type implements one operation: run against the session,
//! producing a finite sequence of events. The first error terminates the
//! sequence. Each agent stores its final output under its own node id
//! before yielding its terminal `node_completed`.

mod input;
mod llm;
mod output;
mod remote;
mod tool;

pub use input::InputAgent;
pub use llm::LlmAgent;
pub use output::OutputAgent;
pub use remote::RemoteAgent;
pub use tool::ToolAgent;

use crate::definition::{NodeDefinition, NodeKind};
use crate::error::Result;
use crate::events::ExecutionEvent;
use crate::provider::Providers;
use crate::session::Session;
use crate::tool::ToolRegistry;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Finite sequence of events produced by one node run.
pub type EventStream<'a> = BoxStream<'a, Result<ExecutionEvent>>;

/// Ambient context for a node run.
#[derive(Clone)]
pub struct RunContext {
    /// Cancellation scope for the whole run. Agents performing long I/O may
    /// observe it; the scheduler also stops polling a cancelled node.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// A single node executor.
pub trait NodeAgent: Send + Sync {
    /// The node id this agent executes, which is also its session key.
    fn id(&self) -> &str;

    /// Run against the session, yielding events until completion or the
    /// first error.
    fn run<'a>(&'a self, ctx: &'a RunContext, session: &'a Session) -> EventStream<'a>;
}

/// Construct the agent for a node definition.
///
/// `parents` must be the node's parent ids in topological order; agents that
/// default their prompt to upstream output depend on that order being
/// deterministic.
pub fn create(
    node: &NodeDefinition,
    parents: Vec<String>,
    providers: Arc<Providers>,
    tools: Arc<ToolRegistry>,
) -> Arc<dyn NodeAgent> {
    match node.kind {
        NodeKind::Input => Arc::new(InputAgent::new(&node.id)),
        NodeKind::Output => Arc::new(OutputAgent::new(&node.id, &node.config, providers)),
        NodeKind::Tool => Arc::new(ToolAgent::new(&node.id, &node.config, tools)),
        NodeKind::Agent => Arc::new(LlmAgent::new(
            &node.id,
            &node.config,
            parents,
            providers,
            tools,
        )),
        NodeKind::External => Arc::new(RemoteAgent::new(&node.id, &node.config, parents)),
    }
}

/// Join the outputs of the given nodes (typically parents in topological
/// order) into one prompt-ready text block.
pub(crate) fn joined_outputs(ids: &[String], session: &Session) -> String {
    ids.iter()
        .filter_map(|id| session.get(id))
        .map(|v| crate::session::value_text(&v))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
