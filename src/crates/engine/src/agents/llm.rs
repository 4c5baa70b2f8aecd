//! Language-model agent node.
//!
//! Templated prompting, tool-call round-tripping, and provider dispatch.
//! Individual tool failures are embedded in the conversation as structured
//! error responses so the model can recover; only provider failures and an
//! exhausted turn budget fail the node.

use crate::agents::{joined_outputs, EventStream, NodeAgent, RunContext};
use crate::error::EngineError;
use crate::events::{ExecutionEvent, TokenUsage, ToolCallInfo, ToolResultInfo};
use crate::provider::{
    collect_response, Content, GenerateConfig, GenerateRequest, Part, Providers, Role,
    ToolDeclaration,
};
use crate::session::Session;
use crate::template;
use crate::tool::ToolRegistry;
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turn budget when the node declares tools.
const DEFAULT_MAX_TURNS_WITH_TOOLS: usize = 10;

/// Executes one model conversation, optionally looping through tool calls.
pub struct LlmAgent {
    id: String,
    model_id: String,
    system_prompt: String,
    prompt: String,
    tool_names: Vec<String>,
    max_turns: usize,
    config: GenerateConfig,
    parents: Vec<String>,
    providers: Arc<Providers>,
    tools: Arc<ToolRegistry>,
}

impl LlmAgent {
    pub fn new(
        id: impl Into<String>,
        config: &HashMap<String, Value>,
        parents: Vec<String>,
        providers: Arc<Providers>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let tool_names: Vec<String> = config
            .get("tools")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let max_turns = config
            .get("max_turns")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(if tool_names.is_empty() {
                1
            } else {
                DEFAULT_MAX_TURNS_WITH_TOOLS
            });

        let generate_config = GenerateConfig {
            temperature: config
                .get("temperature")
                .and_then(|v| v.as_f64())
                .map(|t| t as f32),
            max_output_tokens: config
                .get("max_output_tokens")
                .and_then(|v| v.as_u64())
                .map(|n| n as u32),
        };

        Self {
            id: id.into(),
            model_id: config
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            system_prompt: config
                .get("system_prompt")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            prompt: config
                .get("prompt")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tool_names,
            max_turns,
            config: generate_config,
            parents,
            providers,
            tools,
        }
    }

    /// Initial message sequence: optional templated system turn, then a user
    /// turn from the templated prompt or, when no prompt is configured, the
    /// parent outputs in topological order.
    fn initial_contents(&self, session: &Session) -> Vec<Content> {
        let snapshot = session.snapshot();
        let mut contents = Vec::new();
        if !self.system_prompt.is_empty() {
            contents.push(Content::system(template::resolve(
                &self.system_prompt,
                &snapshot,
            )));
        }
        let prompt = if self.prompt.is_empty() {
            joined_outputs(&self.parents, session)
        } else {
            template::resolve(&self.prompt, &snapshot)
        };
        contents.push(Content::user(prompt));
        contents
    }

    /// Tool declarations for the request. Names unknown to the registry are
    /// silently omitted.
    fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tool_names
            .iter()
            .filter_map(|name| {
                let decl = self.tools.declaration(name);
                if decl.is_none() {
                    warn!(node = %self.id, tool = %name, "configured tool not registered, omitting");
                }
                decl
            })
            .collect()
    }

    /// Run one tool call, coercing the outcome into a structured response
    /// object. Never fails the node.
    async fn dispatch_call(&self, name: &str, args: Value) -> Value {
        if self.tools.get(name).is_none() {
            return json!({"error": format!("unknown tool '{}'", name)});
        }
        match self.tools.execute(name, args).await {
            Ok(result) => json!({"result": result}),
            Err(err) => json!({"error": err.to_string()}),
        }
    }
}

impl NodeAgent for LlmAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<'a>(&'a self, _ctx: &'a RunContext, session: &'a Session) -> EventStream<'a> {
        try_stream! {
            yield ExecutionEvent::node_started(&self.id);

            let (provider, model) = self.providers.resolve(&self.model_id)?;
            let mut contents = self.initial_contents(session);
            let declarations = self.declarations();

            for turn in 0..self.max_turns {
                let mut request = GenerateRequest::new(model.clone(), contents.clone())
                    .with_tools(declarations.clone());
                if self.config.temperature.is_some() || self.config.max_output_tokens.is_some() {
                    request = request.with_config(self.config);
                }

                let response = collect_response(provider.generate(request).await?).await?;
                let calls: Vec<(Option<String>, String, Value)> = response
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        Part::FunctionCall { id, name, args } => {
                            Some((id.clone(), name.clone(), args.clone()))
                        }
                        _ => None,
                    })
                    .collect();

                if calls.is_empty() {
                    let text = response.content.text().trim().to_string();
                    session.set(&self.id, json!(text));

                    // Usage and finish reason pass through from the provider
                    // response untouched.
                    yield ExecutionEvent::NodeCompleted {
                        node_id: self.id.clone(),
                        output: json!(text),
                        state_delta: None,
                        tokens: response.usage.map(|u| TokenUsage {
                            input: u.prompt_tokens,
                            output: u.completion_tokens,
                            total: u.total_tokens,
                        }),
                        finish_reason: response.finish_reason.map(|f| f.as_str().to_string()),
                        completed_at: None,
                    };
                    return;
                }

                debug!(node = %self.id, turn, calls = calls.len(), "model requested tools");
                yield ExecutionEvent::ToolCall {
                    node_id: self.id.clone(),
                    calls: calls
                        .iter()
                        .map(|(_, name, args)| ToolCallInfo {
                            name: name.clone(),
                            args: args.clone(),
                        })
                        .collect(),
                };

                let mut results = Vec::with_capacity(calls.len());
                let mut response_parts = Vec::with_capacity(calls.len());
                for (call_id, name, args) in &calls {
                    let outcome = self.dispatch_call(name, args.clone()).await;
                    results.push(ToolResultInfo {
                        name: name.clone(),
                        response: outcome.clone(),
                    });
                    response_parts.push(Part::FunctionResponse {
                        id: call_id.clone(),
                        name: name.clone(),
                        response: outcome,
                    });
                }

                yield ExecutionEvent::ToolResult {
                    node_id: self.id.clone(),
                    results,
                };

                contents.push(Content::assistant(response.content.parts.clone()));
                contents.push(Content {
                    role: Role::User,
                    parts: response_parts,
                });
            }

            Err(EngineError::MaxTurnsExceeded(self.max_turns))?;
        }
        .boxed()
    }
}
