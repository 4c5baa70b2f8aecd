//! Declarative workflow definitions.
//!
//! A workflow is a named, versioned DAG of typed nodes. Definitions are pure
//! data: they round-trip through the JSON wire format unchanged and carry no
//! execution state. Visual groups are cosmetic and ignored by the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The closed set of node types understood by the engine.
///
/// The variant tag matches the wire `type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// User-supplied value, read from the session at run start.
    Input,
    /// Collects upstream results into a final rendering.
    Output,
    /// Invokes a registered deterministic tool.
    Tool,
    /// Language-model agent with optional tool calling.
    Agent,
    /// Remote workflow service reached over JSON-RPC.
    External,
}

impl NodeKind {
    /// Wire name of this node kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Tool => "tool",
            NodeKind::Agent => "agent",
            NodeKind::External => "external",
        }
    }
}

/// A single node in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node identifier within the workflow.
    pub id: String,
    /// Node type tag.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Free-form configuration; each node type declares the keys it reads.
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Optional visual group membership. Cosmetic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl NodeDefinition {
    /// Create a node definition with an empty configuration.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: HashMap::new(),
            group: None,
        }
    }

    /// Add a configuration entry.
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Read a string-valued configuration key.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Loop annotation on an edge. Loop edges are preserved through persistence
/// round-trips but do not participate in scheduling or cycle detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum number of iterations before the loop exits unconditionally.
    pub max_iterations: u32,
    /// Predicate expression that terminates the loop when it holds.
    #[serde(default)]
    pub exit_when: String,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    /// Present on loop back-edges only.
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_config: Option<LoopConfig>,
}

impl EdgeDefinition {
    /// Create a forward edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            loop_config: None,
        }
    }

    /// Whether this edge carries a loop annotation.
    pub fn is_loop(&self) -> bool {
        self.loop_config.is_some()
    }
}

/// A cosmetic grouping of nodes in the visual editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroup {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

/// A complete declarative workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow name; the lookup key for runs.
    pub name: String,
    /// Definition version, incremented on update.
    pub version: i64,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<EdgeDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<NodeGroup>>,
}

impl WorkflowDefinition {
    /// Create an empty workflow at version 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            nodes: Vec::new(),
            edges: Vec::new(),
            groups: None,
        }
    }

    /// Add a node.
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a forward edge.
    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(EdgeDefinition::new(from, to));
        self
    }

    /// Look up a node definition by id.
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
