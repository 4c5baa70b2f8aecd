//! Google Gemini adapter.
//!
//! Speaks the `generateContent` API. System turns become the
//! `systemInstruction` field, tool calls map to `functionCall` /
//! `functionResponse` parts, and `usageMetadata` is surfaced verbatim.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API client.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    config: ProviderConfig,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn convert_contents(contents: &[Content]) -> (Option<Value>, Vec<Value>) {
        let mut system_instruction = None;
        let mut converted = Vec::new();

        for content in contents {
            if content.role == Role::System {
                system_instruction = Some(json!({"parts": [{"text": content.text()}]}));
                continue;
            }
            let role = match content.role {
                Role::Assistant => "model",
                _ => "user",
            };
            let parts: Vec<Value> = content
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text { text } => json!({"text": text}),
                    Part::FunctionCall { name, args, .. } => {
                        json!({"functionCall": {"name": name, "args": args}})
                    }
                    Part::FunctionResponse { name, response, .. } => {
                        json!({"functionResponse": {"name": name, "response": response}})
                    }
                    Part::InlineData { mime_type, data } => {
                        json!({"inlineData": {"mimeType": mime_type, "data": data}})
                    }
                })
                .collect();
            converted.push(json!({"role": role, "parts": parts}));
        }

        (system_instruction, converted)
    }

    fn convert_response(response: GenerateContentResponse) -> Result<GenerateResponse, LlmError> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse("response carries no candidates".to_string())
        })?;

        let mut parts = Vec::new();
        let mut saw_function_call = false;
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                parts.push(Part::Text { text });
            } else if let Some(call) = part.function_call {
                saw_function_call = true;
                parts.push(Part::FunctionCall {
                    id: None,
                    name: call.name,
                    args: call.args.unwrap_or(Value::Null),
                });
            }
        }

        let finish_reason = candidate.finish_reason.as_deref().map(|reason| {
            if saw_function_call {
                return FinishReason::ToolCalls;
            }
            match reason {
                "STOP" => FinishReason::Stop,
                "MAX_TOKENS" => FinishReason::Length,
                "SAFETY" | "PROHIBITED_CONTENT" => FinishReason::ContentFilter,
                _ => FinishReason::Other,
            }
        });

        Ok(GenerateResponse {
            content: Content {
                role: Role::Assistant,
                parts,
            },
            finish_reason,
            usage: response.usage_metadata.map(|u| UsageMetadata {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerateRequest) -> EngineResult<GenerateStream> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url_or(DEFAULT_BASE_URL),
            request.model
        );

        let (system_instruction, contents) = Self::convert_contents(&request.contents);
        let mut body = json!({"contents": contents});
        if let Some(instruction) = system_instruction {
            body["systemInstruction"] = instruction;
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }
        if let Some(config) = request.config {
            let mut generation_config = serde_json::Map::new();
            if let Some(temperature) = config.temperature {
                generation_config.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(max_tokens) = config.max_output_tokens {
                generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
            }
            if !generation_config.is_empty() {
                body["generationConfig"] = Value::Object(generation_config);
            }
        }

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), message).into());
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let converted = Self::convert_response(parsed)?;
        Ok(futures::stream::iter(vec![Ok(converted)]).boxed())
    }
}

// Gemini wire types.

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<WireContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_instruction_split() {
        let (instruction, contents) = GeminiProvider::convert_contents(&[
            Content::system("be factual"),
            Content::user("hello"),
            Content::assistant(vec![Part::text("hi")]),
        ]);

        assert_eq!(
            instruction.unwrap()["parts"][0]["text"],
            json!("be factual")
        );
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn test_response_conversion_with_function_call() {
        let raw: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [{"functionCall": {"name": "lookup", "args": {"q": "x"}}}],
                    "role": "model"
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 4,
                "candidatesTokenCount": 2,
                "totalTokenCount": 6
            }
        }))
        .unwrap();

        let response = GeminiProvider::convert_response(raw).unwrap();
        assert_eq!(response.content.function_calls().len(), 1);
        // Function-call presence wins over the vendor STOP.
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.usage.unwrap().total_tokens, 6);
    }

    #[test]
    fn test_finish_reason_mapping() {
        for (vendor, canonical) in [
            ("STOP", FinishReason::Stop),
            ("MAX_TOKENS", FinishReason::Length),
            ("SAFETY", FinishReason::ContentFilter),
            ("OTHER", FinishReason::Other),
        ] {
            let raw: GenerateContentResponse = serde_json::from_value(json!({
                "candidates": [{"content": {"parts": [{"text": "t"}]}, "finishReason": vendor}]
            }))
            .unwrap();
            assert_eq!(
                GeminiProvider::convert_response(raw).unwrap().finish_reason,
                Some(canonical),
                "{}",
                vendor
            );
        }
    }
}
