//! OpenAI adapter.
//!
//! A thin binding of the chat-completions client to OpenAI's own endpoint;
//! the wire conversion lives in [`crate::openai_compat`].

use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::openai_compat::OpenAiCompatProvider;
use async_trait::async_trait;
use engine::provider::{GenerateRequest, GenerateStream, ModelProvider};
use engine::Result as EngineResult;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client.
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    inner: OpenAiCompatProvider,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url_or(DEFAULT_BASE_URL);
        Ok(Self {
            inner: OpenAiCompatProvider::new("openai", base_url, config)?,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: GenerateRequest) -> EngineResult<GenerateStream> {
        self.inner.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        let provider = OpenAiProvider::new(ProviderConfig::new("key")).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
