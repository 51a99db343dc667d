use crate::agent::memory::Memory;
use crate::agent::tools::base::{ExecutionContext, require_str};
use crate::agent::tools::{Tool, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Saves a fact about a user to long-term memory.
pub struct MemorizeTool {
    memory: Arc<Memory>,
}

impl MemorizeTool {
    pub fn new(memory: Arc<Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemorizeTool {
    fn name(&self) -> &'static str {
        "memorize"
    }

    fn description(&self) -> &'static str {
        "Save information into memory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "string",
                    "description": "The user the information relate to."
                },
                "information": {
                    "type": "string",
                    "description": "The information to save."
                }
            },
            "required": ["user", "information"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let (user, information) =
            match (require_str(&params, "user"), require_str(&params, "information")) {
                (Ok(u), Ok(i)) => (u, i),
                (Err(e), _) | (_, Err(e)) => {
                    return Ok(ToolResult::error(format!("Error: {}", e)));
                }
            };

        if let Err(e) = self.memory.remember(user, information).await {
            return Ok(ToolResult::error(format!("Error: {:#}", e)));
        }
        Ok(ToolResult::new(format!(
            "Information about {} saved: {}",
            user, information
        )))
    }
}
