//! Provider abstraction over language-model backends.
//!
//! The engine is an orchestrator, not an LLM client library: it defines one
//! streaming `generate` contract and leaves the vendor wire formats to
//! adapter crates. Adapters must surface usage metadata verbatim, map vendor
//! stop strings onto the canonical finish reasons, and never drop fields
//! silently.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Role of a content turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a content turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text { text: String },
    /// A tool invocation requested by the model.
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        args: Value,
    },
    /// The result of a tool invocation, sent back to the model.
    FunctionResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        response: Value,
    },
    /// Inline binary content.
    InlineData { mime_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

/// An ordered list of parts tagged with a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![Part::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// Concatenated text parts of this content.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The function-call parts of this content.
    pub fn function_calls(&self) -> Vec<&Part> {
        self.parts
            .iter()
            .filter(|p| matches!(p, Part::FunctionCall { .. }))
            .collect()
    }
}

/// Generation knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// A tool made available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool input.
    pub parameters: Value,
}

/// A request to a language-model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model name as the provider understands it (no provider prefix).
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GenerateConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            contents,
            config: None,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_config(mut self, config: GenerateConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other => "other",
        }
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageMetadata {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One chunk of a streamed response. Non-streaming backends return a single
/// chunk carrying the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

/// Stream of response chunks from a provider.
pub type GenerateStream = BoxStream<'static, Result<GenerateResponse>>;

/// Uniform contract over language-model backends.
#[async_trait]
pub trait ModelProvider: Send + Sync + std::fmt::Debug {
    /// The provider name this instance answers to (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Send one request and stream response chunks back.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateStream>;
}

/// Fold a chunk stream into a single response.
///
/// Text parts are concatenated, function calls accumulate in arrival order,
/// and the last reported usage and finish reason win. Usage and finish
/// reason pass through untouched so downstream events can propagate them
/// verbatim.
pub async fn collect_response(mut stream: GenerateStream) -> Result<GenerateResponse> {
    let mut text = String::new();
    let mut other_parts: Vec<Part> = Vec::new();
    let mut finish_reason = None;
    let mut usage = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for part in chunk.content.parts {
            match part {
                Part::Text { text: t } => text.push_str(&t),
                other => other_parts.push(other),
            }
        }
        if chunk.finish_reason.is_some() {
            finish_reason = chunk.finish_reason;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
    }

    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(Part::Text { text });
    }
    parts.extend(other_parts);

    Ok(GenerateResponse {
        content: Content {
            role: Role::Assistant,
            parts,
        },
        finish_reason,
        usage,
    })
}

/// The set of provider instances available to a run, keyed by provider name.
#[derive(Clone, Default)]
pub struct Providers {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider instance under its own name.
    pub fn insert(&mut self, provider: Arc<dyn ModelProvider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a `provider/model` id into a provider instance and the bare
    /// model name.
    pub fn resolve(&self, model_id: &str) -> Result<(Arc<dyn ModelProvider>, String)> {
        let (provider_name, model) = model_id
            .split_once('/')
            .ok_or_else(|| EngineError::UnknownModel(model_id.to_string()))?;
        let provider = self
            .get(provider_name)
            .ok_or_else(|| EngineError::UnknownProvider(provider_name.to_string()))?;
        Ok((provider, model.to_string()))
    }

    /// The lexicographically first registered provider, used as the ambient
    /// fallback when a node names no provider.
    pub fn first(&self) -> Option<Arc<dyn ModelProvider>> {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort_unstable();
        names.first().and_then(|n| self.get(n))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
