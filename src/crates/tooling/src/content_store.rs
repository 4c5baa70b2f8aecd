//! In-memory key/value content store tools.
//!
//! `content_save` and `content_get` share one store, letting one workflow
//! stage stash text that a later stage (or a later pipeline run in the same
//! process) picks up by key.

use async_trait::async_trait;
use engine::error::{EngineError, Result};
use engine::tool::Tool;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared backing store for the content tools.
#[derive(Clone, Default)]
pub struct ContentStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The save tool bound to this store.
    pub fn save_tool(&self) -> ContentSaveTool {
        ContentSaveTool {
            store: self.clone(),
        }
    }

    /// The get tool bound to this store.
    pub fn get_tool(&self) -> ContentGetTool {
        ContentGetTool {
            store: self.clone(),
        }
    }
}

/// Stores a piece of content under a key.
pub struct ContentSaveTool {
    store: ContentStore,
}

#[async_trait]
impl Tool for ContentSaveTool {
    fn name(&self) -> &str {
        "content_save"
    }

    fn description(&self) -> &str {
        "Save content under a key for later retrieval with content_get"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Storage key"},
                "content": {"type": "string", "description": "Content to store"}
            },
            "required": ["key", "content"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let key = input["key"].as_str().unwrap_or_default().to_string();
        let content = input["content"].as_str().unwrap_or_default().to_string();
        let length = content.len();
        self.store.entries.write().insert(key.clone(), content);
        Ok(json!({"saved": key, "bytes": length}))
    }
}

/// Retrieves previously saved content by key.
pub struct ContentGetTool {
    store: ContentStore,
}

#[async_trait]
impl Tool for ContentGetTool {
    fn name(&self) -> &str {
        "content_get"
    }

    fn description(&self) -> &str {
        "Retrieve content previously saved with content_save"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Storage key"}
            },
            "required": ["key"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let key = input["key"].as_str().unwrap_or_default();
        match self.store.entries.read().get(key) {
            Some(content) => Ok(json!({"key": key, "content": content})),
            None => Err(EngineError::ToolExecution {
                tool: "content_get".to_string(),
                message: format!("no content stored under key '{}'", key),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_get() {
        let store = ContentStore::new();
        let save = store.save_tool();
        let get = store.get_tool();

        save.execute(json!({"key": "draft", "content": "hello"}))
            .await
            .unwrap();
        let result = get.execute(json!({"key": "draft"})).await.unwrap();
        assert_eq!(result["content"], "hello");
    }

    #[tokio::test]
    async fn test_get_missing_key_fails() {
        let store = ContentStore::new();
        let err = store
            .get_tool()
            .execute(json!({"key": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = ContentStore::new();
        let save = store.save_tool();
        save.execute(json!({"key": "k", "content": "one"}))
            .await
            .unwrap();
        save.execute(json!({"key": "k", "content": "two"}))
            .await
            .unwrap();
        let result = store.get_tool().execute(json!({"key": "k"})).await.unwrap();
        assert_eq!(result["content"], "two");
    }
}
