//! Process-wide provider factory registry.
//!
//! Factories are keyed by provider-type name. The workflow service builds
//! provider instances from configuration at startup; a request for an
//! unknown type falls back to the OpenAI-compatible adapter when the
//! configuration carries a base URL, since that wire format is the lingua
//! franca of self-hosted backends.

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use crate::{AnthropicProvider, GeminiProvider, OpenAiCompatProvider, OpenAiProvider};
use engine::provider::ModelProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Constructor for one provider type. Receives the requested name so
/// fallback adapters can answer to it.
pub type ProviderFactory = fn(&str, ProviderConfig) -> Result<Arc<dyn ModelProvider>>;

/// Registry of provider factories keyed on provider-type name.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in provider types registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("anthropic", |_, config| {
            Ok(Arc::new(AnthropicProvider::new(config)?))
        });
        registry.register("openai", |_, config| {
            Ok(Arc::new(OpenAiProvider::new(config)?))
        });
        registry.register("gemini", |_, config| {
            Ok(Arc::new(GeminiProvider::new(config)?))
        });
        registry.register("openai-compat", |name, config| {
            Ok(Arc::new(OpenAiCompatProvider::fallback(name, config)?))
        });
        registry
    }

    /// Register a factory under a provider-type name.
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Build a provider instance.
    ///
    /// Unknown types fall back to the OpenAI-compatible adapter when the
    /// configuration names a base URL; otherwise the build fails.
    pub fn build(&self, name: &str, config: ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
        if let Some(factory) = self.factories.get(name) {
            return factory(name, config);
        }
        if config.base_url.is_some() {
            info!(provider = name, "unknown provider type, using OpenAI-compatible fallback");
            return Ok(Arc::new(OpenAiCompatProvider::fallback(name, config)?));
        }
        Err(LlmError::Config(format!(
            "unknown provider type '{}'",
            name
        )))
    }

    /// Registered provider-type names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_build() {
        let registry = ProviderRegistry::with_builtins();
        for name in ["anthropic", "openai", "gemini"] {
            let provider = registry.build(name, ProviderConfig::new("key")).unwrap();
            assert_eq!(provider.name(), name);
        }
    }

    #[test]
    fn test_unknown_type_without_base_url_fails() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry
            .build("mystery", ProviderConfig::new("key"))
            .unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_unknown_type_with_base_url_falls_back() {
        let registry = ProviderRegistry::with_builtins();
        let provider = registry
            .build(
                "ollama",
                ProviderConfig::new("").with_base_url("http://localhost:11434/v1"),
            )
            .unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_names_sorted() {
        let registry = ProviderRegistry::with_builtins();
        let names = registry.names();
        assert_eq!(names, vec!["anthropic", "gemini", "openai", "openai-compat"]);
    }
}
