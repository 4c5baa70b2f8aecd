//! Tool node: one deterministic tool invocation.

use crate::agents::{EventStream, NodeAgent, RunContext};
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ToolCallInfo, ToolResultInfo};
use crate::session::Session;
use crate::template;
use crate::tool::ToolRegistry;
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves its configured input through the template engine and invokes a
/// registered tool. Unlike the model agent's tool loop, a failing tool here
/// fails the run.
pub struct ToolAgent {
    id: String,
    tool_name: String,
    input: Value,
    tools: Arc<ToolRegistry>,
}

impl ToolAgent {
    pub fn new(
        id: impl Into<String>,
        config: &HashMap<String, Value>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let tool_name = config
            .get("tool_name")
            .or_else(|| config.get("tool"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Self {
            id: id.into(),
            tool_name,
            input: config.get("input").cloned().unwrap_or(Value::Null),
            tools,
        }
    }

    /// Template-resolve every string leaf of the configured input.
    fn resolve_input(&self, session: &Session) -> Value {
        let snapshot = session.snapshot();
        resolve_value(&self.input, &snapshot)
    }
}

fn resolve_value(value: &Value, snapshot: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(template::resolve(s, snapshot)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, snapshot)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, snapshot)))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl NodeAgent for ToolAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<'a>(&'a self, _ctx: &'a RunContext, session: &'a Session) -> EventStream<'a> {
        try_stream! {
            yield ExecutionEvent::node_started(&self.id);

            if self.tool_name.is_empty() {
                Err(EngineError::UnknownTool(format!(
                    "tool node '{}' names no tool",
                    self.id
                )))?;
            }

            let input = self.resolve_input(session);
            yield ExecutionEvent::ToolCall {
                node_id: self.id.clone(),
                calls: vec![ToolCallInfo {
                    name: self.tool_name.clone(),
                    args: input.clone(),
                }],
            };

            let result = self.tools.execute(&self.tool_name, input).await?;

            yield ExecutionEvent::ToolResult {
                node_id: self.id.clone(),
                results: vec![ToolResultInfo {
                    name: self.tool_name.clone(),
                    response: result.clone(),
                }],
            };

            session.set(&self.id, result.clone());
            yield ExecutionEvent::node_completed(&self.id, result);
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }
        async fn execute(&self, input: Value) -> Result<Value> {
            Ok(json!({"echoed": input["text"]}))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_templated_invocation() {
        let session = Session::new();
        session.set("__user_input__topic", json!("rust"));

        let mut config = HashMap::new();
        config.insert("tool_name".to_string(), json!("echo"));
        config.insert("input".to_string(), json!({"text": "about {{topic}}"}));

        let agent = ToolAgent::new("t", &config, registry());
        let ctx = RunContext::default();
        let events: Vec<ExecutionEvent> = agent
            .run(&ctx, &session)
            .map(|e| e.unwrap())
            .collect()
            .await;

        let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["node_started", "tool_call", "tool_result", "node_completed"]
        );
        match &events[1] {
            ExecutionEvent::ToolCall { calls, .. } => {
                assert_eq!(calls[0].args, json!({"text": "about rust"}))
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.get("t"), Some(json!({"echoed": "about rust"})));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_run() {
        let mut config = HashMap::new();
        config.insert("tool_name".to_string(), json!("missing"));
        config.insert("input".to_string(), json!({}));

        let agent = ToolAgent::new("t", &config, registry());
        let ctx = RunContext::default();
        let session = Session::new();
        let events: Vec<_> = agent.run(&ctx, &session).collect().await;

        let err = events.last().unwrap().as_ref().unwrap_err();
        assert!(matches!(err, EngineError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_schema_violation_fails_run() {
        let mut config = HashMap::new();
        config.insert("tool_name".to_string(), json!("echo"));
        config.insert("input".to_string(), json!({"wrong": true}));

        let agent = ToolAgent::new("t", &config, registry());
        let ctx = RunContext::default();
        let session = Session::new();
        let events: Vec<_> = agent.run(&ctx, &session).collect().await;

        let err = events.last().unwrap().as_ref().unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }
}
