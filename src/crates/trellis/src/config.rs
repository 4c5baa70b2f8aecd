//! Server configuration.
//!
//! A flat key-value TOML file, with environment variables taking precedence
//! for secrets. Providers are only instantiated for the keys that are
//! actually configured.

use crate::error::{Result, ServerError};
use engine::provider::Providers;
use llm::{ProviderConfig, ProviderRegistry};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn default_port() -> u16 {
    8080
}

/// Flat server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the sqlite file backing the durable store. Absent means
    /// memory-only persistence.
    #[serde(default)]
    pub database_path: Option<String>,

    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_base_url: Option<String>,

    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,

    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub gemini_base_url: Option<String>,

    /// One extra OpenAI-compatible backend (e.g. a local Ollama), named
    /// freely and resolved through the registry fallback.
    #[serde(default)]
    pub extra_provider_name: Option<String>,
    #[serde(default)]
    pub extra_provider_base_url: Option<String>,
    #[serde(default)]
    pub extra_provider_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            openai_api_key: None,
            openai_base_url: None,
            gemini_api_key: None,
            gemini_base_url: None,
            extra_provider_name: None,
            extra_provider_base_url: None,
            extra_provider_api_key: None,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, then apply environment overrides. A missing
    /// file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| ServerError::Config(format!("reading {}: {}", path.display(), e)))?;
            toml::from_str(&raw)
                .map_err(|e| ServerError::Config(format!("parsing {}: {}", path.display(), e)))?
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        if let Ok(port) = std::env::var("TRELLIS_PORT") {
            config.port = port
                .parse()
                .map_err(|e| ServerError::Config(format!("TRELLIS_PORT: {}", e)))?;
        }
        if let Ok(path) = std::env::var("TRELLIS_DATABASE_PATH") {
            config.database_path = Some(path);
        }
        for (var, slot) in [
            ("ANTHROPIC_API_KEY", &mut config.anthropic_api_key),
            ("OPENAI_API_KEY", &mut config.openai_api_key),
            ("GEMINI_API_KEY", &mut config.gemini_api_key),
        ] {
            if let Ok(key) = std::env::var(var) {
                *slot = Some(key);
            }
        }

        Ok(config)
    }

    /// Instantiate providers for every configured backend.
    pub fn build_providers(&self, registry: &ProviderRegistry) -> Result<Arc<Providers>> {
        let mut providers = Providers::new();

        let configured: [(&str, &Option<String>, &Option<String>); 3] = [
            ("anthropic", &self.anthropic_api_key, &self.anthropic_base_url),
            ("openai", &self.openai_api_key, &self.openai_base_url),
            ("gemini", &self.gemini_api_key, &self.gemini_base_url),
        ];
        for (name, api_key, base_url) in configured {
            let Some(api_key) = api_key else { continue };
            let mut provider_config = ProviderConfig::new(api_key);
            if let Some(base_url) = base_url {
                provider_config = provider_config.with_base_url(base_url);
            }
            let provider = registry
                .build(name, provider_config)
                .map_err(|e| ServerError::Config(e.to_string()))?;
            info!(provider = name, "provider configured");
            providers.insert(provider);
        }

        if let (Some(name), Some(base_url)) =
            (&self.extra_provider_name, &self.extra_provider_base_url)
        {
            let provider_config =
                ProviderConfig::new(self.extra_provider_api_key.clone().unwrap_or_default())
                    .with_base_url(base_url);
            let provider = registry
                .build(name, provider_config)
                .map_err(|e| ServerError::Config(e.to_string()))?;
            info!(provider = %name, "extra provider configured");
            providers.insert(provider);
        }

        Ok(Arc::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_parse_flat_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
port = 9090
database_path = "trellis.db"
anthropic_api_key = "sk-test"
extra_provider_name = "ollama"
extra_provider_base_url = "http://localhost:11434/v1"
"#,
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.database_path.as_deref(), Some("trellis.db"));
        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_build_providers_only_configured() {
        let config: ServerConfig = toml::from_str(
            r#"
anthropic_api_key = "sk-test"
extra_provider_name = "ollama"
extra_provider_base_url = "http://localhost:11434/v1"
"#,
        )
        .unwrap();

        let registry = ProviderRegistry::with_builtins();
        let providers = config.build_providers(&registry).unwrap();
        assert!(providers.get("anthropic").is_some());
        assert!(providers.get("ollama").is_some());
        assert!(providers.get("openai").is_none());
    }
}
