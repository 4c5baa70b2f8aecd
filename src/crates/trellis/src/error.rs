//! Server-side error types.

use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised by the workflow service, pipeline orchestrator, and
/// repositories.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An engine-level failure (definition, node, provider, tool).
    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    /// A named workflow, pipeline, or run does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is malformed or not valid in the current state.
    #[error("{0}")]
    InvalidRequest(String),

    /// A pipeline references a stage type with no registered executor.
    #[error("unknown stage type '{0}'")]
    UnknownStageType(String),

    /// A waiting pipeline run was rejected by the user.
    #[error("rejected by user")]
    RejectedByUser,

    /// Configuration file or environment problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence failure.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}
