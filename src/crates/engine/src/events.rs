//! Execution events and the in-process event bus.
//!
//! Events are the only observable a run emits. They serialize with an
//! internal `type` tag matching the public event kind, so the same value
//! serves engine-internal plumbing, the SSE wire format, and tests.
//!
//! The bus delivers published events to every subscriber without ever
//! blocking the publisher: each subscriber owns a bounded buffer and late
//! consumers lose events rather than back-pressuring the engine.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Suggested per-subscriber buffer capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Token usage reported by a provider, propagated verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// One tool invocation requested by a model or tool node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: String,
    pub args: Value,
}

/// One tool invocation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultInfo {
    pub name: String,
    pub response: Value,
}

/// An observation emitted during a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A node began executing.
    NodeStarted {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<i64>,
    },
    /// A node finished and stored its output in the session.
    NodeCompleted {
        node_id: String,
        output: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state_delta: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<TokenUsage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_at: Option<i64>,
    },
    /// A model or tool node requested tool invocations.
    ToolCall {
        node_id: String,
        calls: Vec<ToolCallInfo>,
    },
    /// Tool invocations returned.
    ToolResult {
        node_id: String,
        results: Vec<ToolResultInfo>,
    },
    /// A node was skipped without running.
    NodeSkipped { node_id: String },
    /// A node is waiting on an external signal.
    NodeWaiting { node_id: String },
    /// A waiting node resumed.
    NodeResumed { node_id: String },
    /// Free-form progress line.
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        message: String,
    },
    /// Informational message not tied to a node.
    Info { message: String },
    /// A node failed. Non-terminal; the terminal `done` carries the root cause.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        message: String,
    },
    /// Terminal event: run status plus the final session snapshot.
    Done {
        status: String,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<HashMap<String, Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ExecutionEvent {
    /// The public event kind, as written on the SSE `event:` line.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::NodeStarted { .. } => "node_started",
            ExecutionEvent::NodeCompleted { .. } => "node_completed",
            ExecutionEvent::ToolCall { .. } => "tool_call",
            ExecutionEvent::ToolResult { .. } => "tool_result",
            ExecutionEvent::NodeSkipped { .. } => "node_skipped",
            ExecutionEvent::NodeWaiting { .. } => "node_waiting",
            ExecutionEvent::NodeResumed { .. } => "node_resumed",
            ExecutionEvent::Log { .. } => "log",
            ExecutionEvent::Info { .. } => "info",
            ExecutionEvent::Error { .. } => "error",
            ExecutionEvent::Done { .. } => "done",
        }
    }

    /// The originating node id, when the event has one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeStarted { node_id, .. }
            | ExecutionEvent::NodeCompleted { node_id, .. }
            | ExecutionEvent::ToolCall { node_id, .. }
            | ExecutionEvent::ToolResult { node_id, .. }
            | ExecutionEvent::NodeSkipped { node_id }
            | ExecutionEvent::NodeWaiting { node_id }
            | ExecutionEvent::NodeResumed { node_id } => Some(node_id),
            ExecutionEvent::Log { node_id, .. } | ExecutionEvent::Error { node_id, .. } => {
                node_id.as_deref()
            }
            _ => None,
        }
    }

    /// Whether this is the terminal `done` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::Done { .. })
    }

    /// Serialize the event payload without the `type` tag.
    ///
    /// The kind already travels on the SSE `event:` line, so the `data:`
    /// payload carries only the kind-specific fields.
    pub fn payload(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("event serializes");
        if let Value::Object(map) = &mut value {
            map.remove("type");
        }
        value
    }

    /// Create a `node_started` event. The timestamp is stamped later by the
    /// workflow service.
    pub fn node_started(node_id: impl Into<String>) -> Self {
        ExecutionEvent::NodeStarted {
            node_id: node_id.into(),
            started_at: None,
        }
    }

    /// Create a `node_completed` event carrying only an output.
    pub fn node_completed(node_id: impl Into<String>, output: Value) -> Self {
        ExecutionEvent::NodeCompleted {
            node_id: node_id.into(),
            output,
            state_delta: None,
            tokens: None,
            finish_reason: None,
            completed_at: None,
        }
    }

    /// Create an `error` event attributed to a node.
    pub fn node_error(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionEvent::Error {
            node_id: Some(node_id.into()),
            message: message.into(),
        }
    }

    /// Create the terminal event for a successful run.
    pub fn done_completed(session_id: impl Into<String>, state: HashMap<String, Value>) -> Self {
        ExecutionEvent::Done {
            status: "completed".to_string(),
            session_id: session_id.into(),
            state: Some(state),
            error: None,
        }
    }

    /// Create the terminal event for a failed run.
    pub fn done_failed(session_id: impl Into<String>, error: impl Into<String>) -> Self {
        ExecutionEvent::Done {
            status: "failed".to_string(),
            session_id: session_id.into(),
            state: None,
            error: Some(error.into()),
        }
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ExecutionEvent>,
}

/// In-process pub/sub fan-out for execution events.
///
/// `publish` is non-blocking: full subscriber buffers drop the event rather
/// than stalling the engine. Events from one publishing site reach each
/// subscriber in publish order; nothing is guaranteed across independent
/// publishers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with the default buffer capacity.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Register a subscriber with an explicit buffer capacity.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, tx });
        Subscription {
            id,
            receiver: rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Deliver an event to every subscriber without blocking.
    pub fn publish(&self, event: &ExecutionEvent) {
        // Copy the sender list so delivery happens outside the lock.
        let targets: Vec<(u64, mpsc::Sender<ExecutionEvent>)> = {
            let subs = self.subscribers.lock();
            subs.iter().map(|s| (s.id, s.tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = id, kind = event.kind(), "event bus subscriber buffer full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }
        if !dead.is_empty() {
            self.subscribers.lock().retain(|s| !dead.contains(&s.id));
        }
    }

    /// Consumer-style sequence of events, closed when the token is cancelled.
    pub fn channel(
        &self,
        cancel: CancellationToken,
        capacity: usize,
    ) -> impl futures::Stream<Item = ExecutionEvent> {
        let mut subscription = self.subscribe_with_capacity(capacity);
        async_stream::stream! {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = subscription.recv() => match event {
                        Some(event) => yield event,
                        None => break,
                    },
                }
            }
        }
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// A registered subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<ExecutionEvent>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl Subscription {
    /// Receive the next buffered event.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.lock().retain(|s| s.id != self.id);
    }
}
