//! External agent node: delegates to a remote workflow service over
//! JSON-RPC.
//!
//! The remote peer is treated like a provider that happens to live behind an
//! HTTP endpoint: one blocking `a2a.sendMessage` call in, one completed task
//! with artifacts out.

use crate::agents::{joined_outputs, EventStream, NodeAgent, RunContext};
use crate::error::{EngineError, Result};
use crate::events::ExecutionEvent;
use crate::session::{value_text, Session};
use async_stream::try_stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Session key that, when present, overrides the message sent to the remote
/// agent.
pub const A2A_MESSAGE_KEY: &str = "__a2a_message__";

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Task>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Task {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

impl Task {
    /// Task state, tolerating both a bare string status and an object with a
    /// `state` field.
    fn state(&self) -> &str {
        match &self.status {
            Value::String(s) => s,
            Value::Object(map) => map.get("state").and_then(|v| v.as_str()).unwrap_or(""),
            _ => "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(default)]
    parts: Vec<ArtifactPart>,
    #[serde(default)]
    index: i64,
}

#[derive(Debug, Deserialize)]
struct ArtifactPart {
    #[serde(rename = "type", default)]
    part_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Sends upstream output to a remote workflow service and blocks until the
/// remote task completes.
pub struct RemoteAgent {
    id: String,
    endpoint_url: Option<String>,
    parents: Vec<String>,
    client: reqwest::Client,
}

impl RemoteAgent {
    pub fn new(
        id: impl Into<String>,
        config: &HashMap<String, Value>,
        parents: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            endpoint_url: config
                .get("endpoint_url")
                .and_then(|v| v.as_str())
                .map(String::from),
            parents,
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn message_text(&self, session: &Session) -> String {
        match session.get(A2A_MESSAGE_KEY) {
            Some(value) => value_text(&value),
            None => joined_outputs(&self.parents, session),
        }
    }

    async fn send_message(&self, endpoint: &str, text: &str) -> Result<String> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "a2a.sendMessage",
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{"type": "text", "text": text}]
                },
                "blocking": true
            }
        });

        debug!(node = %self.id, %endpoint, "dispatching a2a.sendMessage");

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::RemoteTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::RemoteTransport(format!(
                "endpoint returned {}: {}",
                status, body
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| EngineError::RemoteTransport(format!("invalid response body: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(EngineError::RemoteFailed(format!(
                "JSON-RPC error {}: {}",
                error.code, error.message
            )));
        }
        let task = envelope
            .result
            .ok_or_else(|| EngineError::RemoteFailed("response carries no result".to_string()))?;

        if task.state() != "completed" {
            return Err(EngineError::RemoteFailed(format!(
                "remote task ended in state '{}'",
                task.state()
            )));
        }

        extract_output(&task)
    }
}

/// First text artifact wins; a data artifact falls back to its JSON
/// serialisation.
fn extract_output(task: &Task) -> Result<String> {
    let mut artifacts: Vec<&Artifact> = task.artifacts.iter().collect();
    artifacts.sort_by_key(|a| a.index);

    for artifact in &artifacts {
        for part in &artifact.parts {
            if part.part_type == "text" {
                if let Some(text) = &part.text {
                    return Ok(text.clone());
                }
            }
        }
    }
    for artifact in &artifacts {
        for part in &artifact.parts {
            if part.part_type == "data" {
                if let Some(data) = &part.data {
                    return Ok(data.to_string());
                }
            }
        }
    }
    Err(EngineError::RemoteFailed(
        "completed task carries no usable artifact".to_string(),
    ))
}

impl NodeAgent for RemoteAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<'a>(&'a self, _ctx: &'a RunContext, session: &'a Session) -> EventStream<'a> {
        try_stream! {
            yield ExecutionEvent::node_started(&self.id);

            let endpoint = self
                .endpoint_url
                .clone()
                .ok_or_else(|| EngineError::NoEndpoint(self.id.clone()))?;

            let text = self.message_text(session);
            let output = self.send_message(&endpoint, &text).await?;

            session.set(&self.id, json!(output));
            yield ExecutionEvent::node_completed(&self.id, json!(output));
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: Value, artifacts: Vec<Artifact>) -> Task {
        Task { status, artifacts }
    }

    #[test]
    fn test_task_state_shapes() {
        assert_eq!(task(json!("completed"), vec![]).state(), "completed");
        assert_eq!(
            task(json!({"state": "failed"}), vec![]).state(),
            "failed"
        );
        assert_eq!(task(Value::Null, vec![]).state(), "");
    }

    #[test]
    fn test_extract_prefers_text_artifact() {
        let t = task(
            json!("completed"),
            vec![
                Artifact {
                    parts: vec![ArtifactPart {
                        part_type: "data".to_string(),
                        text: None,
                        data: Some(json!({"k": 1})),
                    }],
                    index: 0,
                },
                Artifact {
                    parts: vec![ArtifactPart {
                        part_type: "text".to_string(),
                        text: Some("answer".to_string()),
                        data: None,
                    }],
                    index: 1,
                },
            ],
        );
        assert_eq!(extract_output(&t).unwrap(), "answer");
    }

    #[test]
    fn test_extract_falls_back_to_data() {
        let t = task(
            json!("completed"),
            vec![Artifact {
                parts: vec![ArtifactPart {
                    part_type: "data".to_string(),
                    text: None,
                    data: Some(json!({"k": 1})),
                }],
                index: 0,
            }],
        );
        assert_eq!(extract_output(&t).unwrap(), r#"{"k":1}"#);
    }

    #[test]
    fn test_extract_empty_fails() {
        let t = task(json!("completed"), vec![]);
        assert!(matches!(
            extract_output(&t).unwrap_err(),
            EngineError::RemoteFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let agent = RemoteAgent::new("ext", &HashMap::new(), vec![]);
        let ctx = RunContext::default();
        let session = Session::new();
        let events: Vec<_> = agent.run(&ctx, &session).collect().await;

        assert!(matches!(
            events.last().unwrap().as_ref().unwrap_err(),
            EngineError::NoEndpoint(_)
        ));
    }

    #[tokio::test]
    async fn test_message_text_prefers_a2a_override() {
        let session = Session::new();
        session.set("p1", json!("parent output"));
        session.set(A2A_MESSAGE_KEY, json!("override"));

        let agent = RemoteAgent::new("ext", &HashMap::new(), vec!["p1".to_string()]);
        assert_eq!(agent.message_text(&session), "override");
    }
}
