//! Output node: collects upstream results into a final rendering.

use crate::agents::{EventStream, NodeAgent, RunContext};
use crate::error::Result;
use crate::events::ExecutionEvent;
use crate::provider::{collect_response, Content, GenerateRequest, Providers};
use crate::session::Session;
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const LAYOUT_SYSTEM_PROMPT: &str =
    "Render the following content as a self-contained styled HTML document.";

/// Default model used by `auto-layout` when no `layout_model` is configured,
/// keyed by provider name.
fn default_layout_model(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "claude-3-5-haiku-latest",
        "openai" => "gpt-4o-mini",
        "gemini" => "gemini-2.0-flash",
        _ => "default",
    }
}

/// Joins every non-internal session value into a deterministic result, or
/// renders the joined content as HTML through a model when configured with
/// `display_mode: auto-layout`.
pub struct OutputAgent {
    id: String,
    display_mode: String,
    layout_model: Option<String>,
    providers: Arc<Providers>,
}

impl OutputAgent {
    pub fn new(
        id: impl Into<String>,
        config: &HashMap<String, Value>,
        providers: Arc<Providers>,
    ) -> Self {
        Self {
            id: id.into(),
            display_mode: config
                .get("display_mode")
                .and_then(|v| v.as_str())
                .unwrap_or("manual")
                .to_string(),
            layout_model: config
                .get("layout_model")
                .and_then(|v| v.as_str())
                .map(String::from),
            providers,
        }
    }

    /// Join all session values whose keys are neither internal nor this
    /// node's own id, sorted by key, blank-line separated.
    fn collect_upstream(&self, session: &Session) -> String {
        let snapshot = session.snapshot();
        let mut keys: Vec<&String> = snapshot
            .keys()
            .filter(|k| !k.starts_with("__") && *k != &self.id)
            .collect();
        keys.sort_unstable();
        keys.iter()
            .map(|k| crate::session::value_text(&snapshot[*k]))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn render_html(&self, content: String) -> Result<String> {
        let (provider, model) = match &self.layout_model {
            Some(model_id) => self.providers.resolve(model_id)?,
            None => {
                let provider = self.providers.first().ok_or_else(|| {
                    crate::error::EngineError::UnknownProvider("<none configured>".to_string())
                })?;
                let model = default_layout_model(provider.name()).to_string();
                (provider, model)
            }
        };

        debug!(node = %self.id, provider = provider.name(), %model, "auto-layout render");

        let request = GenerateRequest::new(
            model,
            vec![Content::system(LAYOUT_SYSTEM_PROMPT), Content::user(content)],
        );
        let response = collect_response(provider.generate(request).await?).await?;
        Ok(response.content.text())
    }
}

impl NodeAgent for OutputAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<'a>(&'a self, _ctx: &'a RunContext, session: &'a Session) -> EventStream<'a> {
        try_stream! {
            yield ExecutionEvent::node_started(&self.id);

            let joined = self.collect_upstream(session);
            let output = match self.display_mode.as_str() {
                "auto-layout" => self.render_html(joined).await?,
                _ => joined,
            };

            session.set(&self.id, json!(output));
            yield ExecutionEvent::node_completed(&self.id, json!(output));
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::provider::{
        FinishReason, GenerateResponse, GenerateStream, ModelProvider, Part, Role, UsageMetadata,
    };
    use async_trait::async_trait;
    use futures::stream;

    #[derive(Debug)]
    struct HtmlProvider;

    #[async_trait]
    impl ModelProvider for HtmlProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(&self, request: GenerateRequest) -> Result<GenerateStream> {
            let body = request.contents.last().map(|c| c.text()).unwrap_or_default();
            let response = GenerateResponse {
                content: Content {
                    role: Role::Assistant,
                    parts: vec![Part::text(format!("<html>{}</html>", body))],
                },
                finish_reason: Some(FinishReason::Stop),
                usage: Some(UsageMetadata::new(1, 1)),
            };
            Ok(stream::iter(vec![Ok(response)]).boxed())
        }
    }

    async fn run_agent(agent: &OutputAgent, session: &Session) -> Vec<ExecutionEvent> {
        let ctx = RunContext::default();
        agent
            .run(&ctx, session)
            .map(|e| e.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_manual_join_sorted_by_key() {
        let session = Session::new();
        session.set("b", json!("second"));
        session.set("a", json!("first"));
        session.set("__user_input__a", json!("hidden"));

        let agent = OutputAgent::new("out", &HashMap::new(), Arc::new(Providers::new()));
        let events = run_agent(&agent, &session).await;

        match &events[1] {
            ExecutionEvent::NodeCompleted { output, .. } => {
                assert_eq!(output, &json!("first\n\nsecond"))
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.get("out"), Some(json!("first\n\nsecond")));
    }

    #[tokio::test]
    async fn test_own_output_excluded_from_join() {
        let session = Session::new();
        session.set("a", json!("value"));
        session.set("out", json!("stale"));

        let agent = OutputAgent::new("out", &HashMap::new(), Arc::new(Providers::new()));
        run_agent(&agent, &session).await;
        assert_eq!(session.get("out"), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_auto_layout_renders_html() {
        let session = Session::new();
        session.set("a", json!("content"));

        let mut providers = Providers::new();
        providers.insert(Arc::new(HtmlProvider));
        let mut config = HashMap::new();
        config.insert("display_mode".to_string(), json!("auto-layout"));
        config.insert("layout_model".to_string(), json!("mock/layout-1"));

        let agent = OutputAgent::new("out", &config, Arc::new(providers));
        let events = run_agent(&agent, &session).await;

        match &events[1] {
            ExecutionEvent::NodeCompleted { output, .. } => {
                assert_eq!(output, &json!("<html>content</html>"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_layout_without_providers_fails() {
        let session = Session::new();
        let mut config = HashMap::new();
        config.insert("display_mode".to_string(), json!("auto-layout"));

        let agent = OutputAgent::new("out", &config, Arc::new(Providers::new()));
        let ctx = RunContext::default();
        let events: Vec<_> = agent.run(&ctx, &session).collect().await;
        assert!(events.last().unwrap().is_err());
    }
}
