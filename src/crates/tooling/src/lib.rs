//! Built-in deterministic tools for trellis workflows.
//!
//! Tools implement [`engine::tool::Tool`] and are registered with the
//! engine's [`engine::tool::ToolRegistry`] at server startup. Each declares
//! a JSON schema; the registry validates inputs before dispatch.

pub mod content_store;
pub mod publish;
pub mod rss;

pub use content_store::ContentStore;
pub use publish::PublishMarkdownTool;
pub use rss::RssFetchTool;

use engine::tool::ToolRegistry;
use std::sync::Arc;

/// Register every built-in tool on the given registry.
pub fn register_builtin_tools(registry: &mut ToolRegistry, content_store: &ContentStore) {
    registry.register(Arc::new(RssFetchTool::new()));
    registry.register(Arc::new(content_store.save_tool()));
    registry.register(Arc::new(content_store.get_tool()));
    registry.register(Arc::new(PublishMarkdownTool::new()));
}
