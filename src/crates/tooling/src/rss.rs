//! RSS feed fetcher tool.
//!
//! Fetches a feed over HTTP and extracts item titles, links, and publish
//! dates. The extraction is a deliberately small scanner over the `<item>`
//! elements; feeds that need full XML semantics are out of scope.

use async_trait::async_trait;
use engine::error::{EngineError, Result};
use engine::tool::Tool;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LIMIT: usize = 10;

/// Fetches an RSS feed and returns its items.
pub struct RssFetchTool {
    client: reqwest::Client,
}

impl RssFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for RssFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RssFetchTool {
    fn name(&self) -> &str {
        "rss_fetch"
    }

    fn description(&self) -> &str {
        "Fetch an RSS feed and return its items (title, link, published)"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Feed URL"},
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of items to return",
                    "minimum": 1
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let url = input["url"].as_str().unwrap_or_default();
        let limit = input["limit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);

        debug!(%url, limit, "fetching rss feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::ToolExecution {
                tool: "rss_fetch".to_string(),
                message: format!("fetch failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ToolExecution {
                tool: "rss_fetch".to_string(),
                message: format!("feed returned status {}", status),
            });
        }

        let body = response.text().await.map_err(|e| EngineError::ToolExecution {
            tool: "rss_fetch".to_string(),
            message: format!("failed to read feed body: {}", e),
        })?;

        let items = parse_items(&body, limit);
        Ok(json!({"url": url, "items": items}))
    }
}

/// Extract up to `limit` items from feed XML.
fn parse_items(body: &str, limit: usize) -> Vec<Value> {
    let mut items = Vec::new();
    let mut rest = body;

    while items.len() < limit {
        let Some(start) = rest.find("<item") else {
            break;
        };
        let Some(end) = rest[start..].find("</item>") else {
            break;
        };
        let item = &rest[start..start + end];
        items.push(json!({
            "title": element_text(item, "title"),
            "link": element_text(item, "link"),
            "published": element_text(item, "pubDate"),
        }));
        rest = &rest[start + end + "</item>".len()..];
    }

    items
}

/// The text content of the first `<tag>...</tag>` element, with CDATA
/// wrappers stripped.
fn element_text(fragment: &str, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let Some(start) = fragment.find(&open) else {
        return String::new();
    };
    let content_start = start + open.len();
    let Some(end) = fragment[content_start..].find(&close) else {
        return String::new();
    };
    let raw = fragment[content_start..content_start + end].trim();
    raw.trim_start_matches("<![CDATA[")
        .trim_end_matches("]]>")
        .trim()
        .to_string()
}
