//! Tool contract and registry.
//!
//! A tool is a named deterministic operation with a JSON input schema.
//! The registry validates inputs against the schema before dispatching, so
//! individual tools can assume well-shaped input.

use crate::error::{EngineError, Result};
use crate::provider::ToolDeclaration;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Deadline applied to every tool execution.
const EXECUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// A deterministic operation callable by tool nodes and model agents.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name of the tool.
    fn name(&self) -> &str;

    /// Human-readable description, surfaced to models as part of the tool
    /// declaration.
    fn description(&self) -> &str;

    /// JSON schema describing the expected input object.
    fn schema(&self) -> Value;

    /// Execute with validated input.
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// Named collection of tools. Read-only after startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous
    /// registration.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// The provider-facing declaration for a registered tool.
    pub fn declaration(&self, name: &str) -> Option<ToolDeclaration> {
        self.get(name).map(|tool| ToolDeclaration {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.schema(),
        })
    }

    /// Validate the input against the tool's schema and execute.
    ///
    /// Fails with [`EngineError::UnknownTool`] for unregistered names and
    /// [`EngineError::SchemaViolation`] when the input does not conform.
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| EngineError::UnknownTool(name.to_string()))?;

        let schema = tool.schema();
        let compiled = jsonschema::JSONSchema::compile(&schema).map_err(|e| {
            EngineError::SchemaViolation {
                tool: name.to_string(),
                message: format!("invalid tool schema: {}", e),
            }
        })?;
        if let Err(errors) = compiled.validate(&input) {
            let message = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EngineError::SchemaViolation {
                tool: name.to_string(),
                message,
            });
        }

        match tokio::time::timeout(EXECUTE_TIMEOUT, tool.execute(input)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::ToolExecution {
                tool: name.to_string(),
                message: format!("timed out after {}s", EXECUTE_TIMEOUT.as_secs()),
            }),
        }
    }
}
