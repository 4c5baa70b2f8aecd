//! Markdown webhook publisher tool.

use async_trait::async_trait;
use engine::error::{EngineError, Result};
use engine::tool::Tool;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes a markdown document to a webhook as JSON.
pub struct PublishMarkdownTool {
    client: reqwest::Client,
}

impl PublishMarkdownTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for PublishMarkdownTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for PublishMarkdownTool {
    fn name(&self) -> &str {
        "publish_markdown"
    }

    fn description(&self) -> &str {
        "POST a markdown document to a webhook URL as {title, body}"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "webhook_url": {"type": "string", "description": "Target webhook URL"},
                "title": {"type": "string", "description": "Document title"},
                "body": {"type": "string", "description": "Markdown body"}
            },
            "required": ["webhook_url", "body"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let webhook_url = input["webhook_url"].as_str().unwrap_or_default();
        let title = input["title"].as_str().unwrap_or_default();
        let body = input["body"].as_str().unwrap_or_default();

        debug!(%webhook_url, title, "publishing markdown");

        let response = self
            .client
            .post(webhook_url)
            .json(&json!({"title": title, "body": body}))
            .send()
            .await
            .map_err(|e| EngineError::ToolExecution {
                tool: "publish_markdown".to_string(),
                message: format!("webhook request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ToolExecution {
                tool: "publish_markdown".to_string(),
                message: format!("webhook returned status {}", status),
            });
        }

        Ok(json!({"published": true, "status": status.as_u16()}))
    }
}
