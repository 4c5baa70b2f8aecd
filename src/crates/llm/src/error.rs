//! Error types for provider adapters.

use thiserror::Error;

/// Result type for provider adapter operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors raised while talking to a language-model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-level failure reaching the backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status.
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Authentication was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The backend is throttling requests.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The backend answered 2xx with a body the adapter cannot use.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The adapter is misconfigured.
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Classify a non-success HTTP status the way every adapter does.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => LlmError::Authentication(message),
            429 => LlmError::RateLimited(message),
            _ => LlmError::Status { status, message },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Adapters surface through the engine as per-node provider failures.
impl From<LlmError> for engine::EngineError {
    fn from(err: LlmError) -> Self {
        engine::EngineError::Provider(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            LlmError::from_status(401, String::new()),
            LlmError::Authentication(_)
        ));
        assert!(matches!(
            LlmError::from_status(429, String::new()),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::from_status(500, String::new()),
            LlmError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn test_status_code_visible_in_engine_error() {
        let err: engine::EngineError =
            LlmError::from_status(500, "boom".to_string()).into();
        assert!(err.to_string().contains("500"));
    }
}
