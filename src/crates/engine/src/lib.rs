//! Workflow execution engine for trellis.
//!
//! Turns a declarative graph of typed nodes into a concurrent,
//! event-streamed run. The crate is organized leaves-first:
//!
//! - [`definition`] - the declarative workflow model and its wire format
//! - [`dag`] - validated graph with a deterministic topological order
//! - [`session`] - per-run keyed state
//! - [`events`] - execution events and the in-process event bus
//! - [`template`] - `{{placeholder}}` resolution against session state
//! - [`provider`] - the language-model provider contract
//! - [`tool`] - the tool contract and registry
//! - [`agents`] - per-node executors (input, output, tool, agent, external)
//! - [`scheduler`] - concurrent DAG execution with failure propagation
//!
//! The engine does not speak to any vendor API itself; provider adapters
//! live in the `llm` crate and register through [`provider::Providers`].

pub mod agents;
pub mod dag;
pub mod definition;
pub mod error;
pub mod events;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod template;
pub mod tool;

pub use dag::Dag;
pub use definition::{
    EdgeDefinition, LoopConfig, NodeDefinition, NodeGroup, NodeKind, WorkflowDefinition,
};
pub use error::{EngineError, Result};
pub use events::{EventBus, ExecutionEvent, Subscription, TokenUsage};
pub use scheduler::{DagScheduler, RunHandle};
pub use session::{user_input_key, Session};
