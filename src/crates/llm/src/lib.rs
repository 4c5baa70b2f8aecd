//! Language-model provider adapters for trellis.
//!
//! The engine defines the provider contract
//! ([`engine::provider::ModelProvider`]); this crate implements it for the
//! vendor APIs the platform ships with:
//!
//! - **Anthropic** - Claude models via the Messages API
//! - **OpenAI** - GPT models via chat completions
//! - **Gemini** - Google models via `generateContent`
//! - **OpenAI-compatible** - any backend speaking the chat-completions wire
//!   format (OpenRouter, Ollama, LM Studio, vLLM, ...)
//!
//! Adapters convert to and from each vendor wire format, surface any usage
//! metadata the vendor returns, and map vendor stop strings onto the
//! canonical finish reasons. They never drop fields silently.
//!
//! [`ProviderRegistry`] holds the factory table used by the server at
//! startup to turn configuration into provider instances.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod openai_compat;
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use config::ProviderConfig;
pub use error::{LlmError, Result};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderFactory, ProviderRegistry};
