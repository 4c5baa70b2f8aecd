//! Error types for the workflow execution engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced while building or executing a workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow definition is malformed (duplicate node id, edge to an
    /// undeclared node, and similar structural problems).
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// The forward-edge subgraph contains a cycle.
    #[error("workflow contains a cycle: {0}")]
    Cycle(String),

    /// An input node has no corresponding user input in the session.
    #[error("missing user input for node '{0}'")]
    MissingInput(String),

    /// A node references a provider that is not registered.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// A model id does not follow the `provider/model` format.
    #[error("unknown model '{0}': expected 'provider/model'")]
    UnknownModel(String),

    /// A node or tool call references a tool that is not registered.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Tool input did not validate against the tool's input schema.
    #[error("tool '{tool}' input schema violation: {message}")]
    SchemaViolation { tool: String, message: String },

    /// A tool's execute returned an error.
    #[error("tool '{tool}' execution failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The language-model agent loop exhausted its turn budget without
    /// producing a tool-call-free response.
    #[error("agent exceeded max turns ({0}) without a final response")]
    MaxTurnsExceeded(usize),

    /// Network failure or non-2xx status from a language-model backend.
    #[error("provider error: {0}")]
    Provider(String),

    /// An external agent node has no `endpoint_url` configured.
    #[error("external agent node '{0}' has no endpoint_url")]
    NoEndpoint(String),

    /// Transport failure reaching a remote agent endpoint.
    #[error("remote agent transport error: {0}")]
    RemoteTransport(String),

    /// A remote agent returned a non-completed task or a JSON-RPC error.
    #[error("remote agent failed: {0}")]
    RemoteFailed(String),

    /// The run was cancelled, either by the caller or because a sibling
    /// node failed.
    #[error("execution cancelled: {0}")]
    Cancelled(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl EngineError {
    /// Whether this error describes a definition-level problem that is
    /// surfaced before any event is emitted.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidDefinition(_) | EngineError::Cycle(_)
        )
    }
}
