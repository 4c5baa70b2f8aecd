//! Anthropic Claude adapter.
//!
//! Speaks the `/v1/messages` API. System turns move into the request-level
//! `system` field, tool calls map onto `tool_use` / `tool_result` content
//! blocks, and the vendor `stop_reason` and `usage` fields are surfaced
//! verbatim on the canonical response.

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
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Claude API client.
#[derive(Clone, Debug)]
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicProvider {
    /// Create a new Claude provider with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Split the canonical contents into the request-level system prompt and
    /// the conversation messages.
    fn convert_contents(&self, contents: &[Content]) -> (Option<String>, Vec<Value>) {
        let mut system: Option<String> = None;
        let mut messages = Vec::new();

        for content in contents {
            if content.role == Role::System {
                let text = content.text();
                system = Some(match system {
                    Some(existing) => format!("{}\n\n{}", existing, text),
                    None => text,
                });
                continue;
            }

            let role = match content.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            let mut blocks = Vec::new();
            for part in &content.parts {
                match part {
                    Part::Text { text } => blocks.push(json!({"type": "text", "text": text})),
                    Part::FunctionCall { id, name, args } => blocks.push(json!({
                        "type": "tool_use",
                        "id": id.clone().unwrap_or_else(|| format!("toolu_{}", name)),
                        "name": name,
                        "input": args,
                    })),
                    Part::FunctionResponse { id, name, response } => blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": id.clone().unwrap_or_else(|| format!("toolu_{}", name)),
                        "content": response.to_string(),
                    })),
                    Part::InlineData { mime_type, data } => blocks.push(json!({
                        "type": "image",
                        "source": {"type": "base64", "media_type": mime_type, "data": data},
                    })),
                }
            }
            messages.push(json!({"role": role, "content": blocks}));
        }

        (system, messages)
    }

    fn convert_response(&self, response: MessagesResponse) -> GenerateResponse {
        let mut parts = Vec::new();
        for block in response.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(text) = block.text {
                        parts.push(Part::Text { text });
                    }
                }
                "tool_use" => parts.push(Part::FunctionCall {
                    id: block.id,
                    name: block.name.unwrap_or_default(),
                    args: block.input.unwrap_or(Value::Null),
                }),
                _ => {}
            }
        }

        let finish_reason = response.stop_reason.as_deref().map(|reason| match reason {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolCalls,
            _ => FinishReason::Other,
        });

        GenerateResponse {
            content: Content {
                role: Role::Assistant,
                parts,
            },
            finish_reason,
            usage: Some(UsageMetadata::new(
                response.usage.input_tokens,
                response.usage.output_tokens,
            )),
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: GenerateRequest) -> EngineResult<GenerateStream> {
        let url = format!("{}/v1/messages", self.config.base_url_or(DEFAULT_BASE_URL));
        let (system, messages) = self.convert_contents(&request.contents);

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request
                .config
                .and_then(|c| c.max_output_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.config.and_then(|c| c.temperature) {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), message).into());
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let converted = self.convert_response(parsed);
        Ok(futures::stream::iter(vec![Ok(converted)]).boxed())
    }
}

// Anthropic wire types.

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(ProviderConfig::new("test-key")).unwrap()
    }

    #[test]
    fn test_system_turn_lifted_out() {
        let (system, messages) = provider().convert_contents(&[
            Content::system("be brief"),
            Content::user("hello"),
        ]);

        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["text"], "hello");
    }

    #[test]
    fn test_tool_round_trip_blocks() {
        let (_, messages) = provider().convert_contents(&[
            Content::assistant(vec![Part::FunctionCall {
                id: Some("toolu_1".to_string()),
                name: "search".to_string(),
                args: json!({"q": "rust"}),
            }]),
            Content {
                role: Role::User,
                parts: vec![Part::FunctionResponse {
                    id: Some("toolu_1".to_string()),
                    name: "search".to_string(),
                    response: json!({"result": []}),
                }],
            },
        ]);

        assert_eq!(messages[0]["content"][0]["type"], "tool_use");
        assert_eq!(messages[0]["content"][0]["id"], "toolu_1");
        assert_eq!(messages[1]["content"][0]["type"], "tool_result");
        assert_eq!(messages[1]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_response_conversion_preserves_usage_and_stop_reason() {
        let raw: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "partial "},
                {"type": "text", "text": "answer"},
                {"type": "tool_use", "id": "toolu_9", "name": "echo", "input": {"x": 1}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 11, "output_tokens": 7}
        }))
        .unwrap();

        let response = provider().convert_response(raw);
        assert_eq!(response.content.text(), "partial answer");
        assert_eq!(response.content.function_calls().len(), 1);
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 11);
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, 18);
    }

    #[test]
    fn test_stop_reason_mapping() {
        for (vendor, canonical) in [
            ("end_turn", FinishReason::Stop),
            ("stop_sequence", FinishReason::Stop),
            ("max_tokens", FinishReason::Length),
            ("tool_use", FinishReason::ToolCalls),
            ("pause_turn", FinishReason::Other),
        ] {
            let raw: MessagesResponse = serde_json::from_value(json!({
                "content": [],
                "stop_reason": vendor,
                "usage": {"input_tokens": 0, "output_tokens": 0}
            }))
            .unwrap();
            assert_eq!(
                provider().convert_response(raw).finish_reason,
                Some(canonical),
                "{}",
                vendor
            );
        }
    }
}
