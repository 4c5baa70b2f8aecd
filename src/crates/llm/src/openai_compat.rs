//! OpenAI-compatible chat-completions adapter.
//!
//! Many backends (OpenAI itself, OpenRouter, Ollama, LM Studio, vLLM) speak
//! the same chat-completions wire format, differing only in base URL and
//! authentication. This adapter carries the shared conversion logic; the
//! provider registry also uses it as the fallback for unknown provider types
//! that configure a base URL.

use crate::config::ProviderConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use engine::provider::{
    Content, FinishReason, GenerateRequest, GenerateResponse, GenerateStream, ModelProvider, Part,
    Role, UsageMetadata,
};
use engine::Result as EngineResult;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// Chat-completions client bound to a provider name and base URL.
#[derive(Clone, Debug)]
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    config: ProviderConfig,
    client: Client,
}

impl OpenAiCompatProvider {
    /// Create a client answering to `name` against the given base URL
    /// (e.g. `https://api.openai.com/v1`).
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        config: ProviderConfig,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    /// Create the registry fallback for an unknown provider type. Requires a
    /// configured base URL.
    pub fn fallback(name: impl Into<String>, config: ProviderConfig) -> Result<Self, LlmError> {
        let name = name.into();
        let base_url = config.base_url.clone().ok_or_else(|| {
            LlmError::Config(format!(
                "provider type '{}' is unknown and no base_url is configured",
                name
            ))
        })?;
        Self::new(name, base_url, config)
    }

    fn convert_contents(contents: &[Content]) -> Vec<Value> {
        let mut messages = Vec::new();
        for content in contents {
            match content.role {
                Role::System => {
                    messages.push(json!({"role": "system", "content": content.text()}));
                }
                Role::User => {
                    // Tool responses become their own `tool` messages; any
                    // text in the same turn stays a plain user message.
                    let text = content.text();
                    if !text.is_empty() {
                        messages.push(json!({"role": "user", "content": text}));
                    }
                    for part in &content.parts {
                        if let Part::FunctionResponse { id, name, response } = part {
                            messages.push(json!({
                                "role": "tool",
                                "tool_call_id": id.clone().unwrap_or_else(|| format!("call_{}", name)),
                                "content": response.to_string(),
                            }));
                        }
                    }
                }
                Role::Assistant => {
                    let text = content.text();
                    let tool_calls: Vec<Value> = content
                        .parts
                        .iter()
                        .filter_map(|part| match part {
                            Part::FunctionCall { id, name, args } => Some(json!({
                                "id": id.clone().unwrap_or_else(|| format!("call_{}", name)),
                                "type": "function",
                                "function": {"name": name, "arguments": args.to_string()},
                            })),
                            _ => None,
                        })
                        .collect();

                    let mut message = json!({"role": "assistant"});
                    message["content"] = if text.is_empty() {
                        Value::Null
                    } else {
                        json!(text)
                    };
                    if !tool_calls.is_empty() {
                        message["tool_calls"] = Value::Array(tool_calls);
                    }
                    messages.push(message);
                }
            }
        }
        messages
    }

    fn convert_response(response: ChatResponse) -> Result<GenerateResponse, LlmError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response carries no choices".to_string()))?;

        let mut parts = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                parts.push(Part::Text { text });
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            // Arguments arrive as a JSON string; tolerate plain text.
            let args = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments));
            parts.push(Part::FunctionCall {
                id: Some(call.id),
                name: call.function.name,
                args,
            });
        }

        let finish_reason = choice.finish_reason.as_deref().map(|reason| match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        });

        Ok(GenerateResponse {
            content: Content {
                role: Role::Assistant,
                parts,
            },
            finish_reason,
            usage: response.usage.map(|u| UsageMetadata {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerateRequest) -> EngineResult<GenerateStream> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": request.model,
            "messages": Self::convert_contents(&request.contents),
        });
        if let Some(temperature) = request.config.and_then(|c| c.temperature) {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.config.and_then(|c| c.max_output_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            },
                        })
                    })
                    .collect(),
            );
        }

        let mut http_request = self.client.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            http_request = http_request.bearer_auth(&self.config.api_key);
        }

        let response = http_request.send().await.map_err(LlmError::from)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), message).into());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let converted = Self::convert_response(parsed)?;
        Ok(futures::stream::iter(vec![Ok(converted)]).boxed())
    }
}

// Chat-completions wire types.

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}
