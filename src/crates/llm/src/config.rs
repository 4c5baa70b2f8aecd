//! Provider configuration.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Configuration for one provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for authentication. May be empty for local backends.
    #[serde(default)]
    pub api_key: String,

    /// Base URL override. Each adapter supplies its vendor default; the
    /// OpenAI-compatible fallback requires one.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request deadline.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            timeout: default_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Create a configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Read the API key from an environment variable.
    pub fn from_env(env_var: &str) -> Result<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| LlmError::Config(format!("environment variable {} not set", env_var)))?;
        Ok(Self::new(api_key))
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The base URL to use, falling back to the adapter's vendor default.
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new("key")
            .with_base_url("http://localhost:11434/v1/")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.api_key, "key");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.base_url_or("https://default"),
            "http://localhost:11434/v1"
        );
    }

    #[test]
    fn test_default_base_url() {
        let config = ProviderConfig::new("key");
        assert_eq!(config.base_url_or("https://api.vendor.com"), "https://api.vendor.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
