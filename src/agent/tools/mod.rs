pub mod base;
pub mod browse;
pub mod gif;
pub mod memorize;
pub mod registry;
pub mod script;

pub use base::{ExecutionContext, Tool, ToolResult};
pub use registry::ToolRegistry;

use crate::agent::memory::Memory;
use crate::config::ToolsConfig;
use std::sync::Arc;
use tracing::info;

/// Register the built-in tool set.
pub fn build_registry(config: &ToolsConfig, memory: Arc<Memory>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(browse::BrowseTool::new(&config.browse)));
    registry.register(Arc::new(gif::GifTool::new(&config.gif)));
    registry.register(Arc::new(memorize::MemorizeTool::new(memory)));
    if config.script.enabled {
        registry.register(Arc::new(script::ScriptTool::new(config.script.clone())));
    } else {
        info!("python tool disabled by config");
    }
    info!("tools registered: {}", registry.tool_names().join(", "));
    registry
}
