//! Per-run session state.
//!
//! A session is the keyed state for one workflow run: each node agent writes
//! exactly one value under its own id, and user-supplied inputs are stored
//! under the synthetic `__user_input__<id>` keys. Readers take a snapshot
//! copy; the only writer for a given key is the agent whose id equals the
//! key, which has already synchronized with its readers through the
//! scheduler's done gates, so a single coarse lock suffices.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Prefix for user-supplied input keys.
pub const USER_INPUT_PREFIX: &str = "__user_input__";

/// The session key under which a user input for the given node id is stored.
pub fn user_input_key(node_id: &str) -> String {
    format!("{}{}", USER_INPUT_PREFIX, node_id)
}

/// Concurrency-safe key/value state for a single workflow run.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: Arc<RwLock<HashMap<String, Value>>>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session pre-populated with user inputs, each stored under
    /// its `__user_input__<id>` key.
    pub fn with_user_inputs(inputs: &HashMap<String, Value>) -> Self {
        let session = Self::new();
        for (id, value) in inputs {
            session.set(user_input_key(id), value.clone());
        }
        session
    }

    /// Store a value under a key, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.state.write().insert(key.into(), value);
    }

    /// Read a value by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().get(key).cloned()
    }

    /// Snapshot-copy the full session state.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.state.read().clone()
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.state.read().contains_key(key)
    }
}

/// Render a session value as display text.
///
/// Strings pass through unchanged; objects that carry a `text` field use it;
/// anything else falls back to its JSON serialisation.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(s)) => s.clone(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}
