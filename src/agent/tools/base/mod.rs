use crate::providers::base::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Convert a `Result<String>` into a `ToolResult`, rendering errors as
    /// `"{error_prefix}: {e}"`.
    pub fn from_result(result: anyhow::Result<String>, error_prefix: &str) -> Self {
        match result {
            Ok(content) => Self::new(content),
            Err(e) => Self::error(format!("{}: {}", error_prefix, e)),
        }
    }
}

impl std::fmt::Display for ToolResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}

/// Context passed to every tool execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Channel the triggering message came from (`discord`, `cli`, ...)
    pub channel: String,
    /// Display name of the author of the triggering message
    pub author: Option<String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments, handed to the model verbatim.
    fn parameters(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> anyhow::Result<ToolResult>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Identical calls may be answered from the registry's result cache.
    /// Only side-effect free lookups opt in.
    fn cacheable(&self) -> bool {
        false
    }

    fn execution_timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }
}

/// Fetch a required, non-blank string argument.
pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(format!("'{}' must not be empty", key)),
        Some(Value::Null) | None => Err(format!("missing '{}' argument", key)),
        Some(_) => Err(format!("'{}' must be a string", key)),
    }
}

#[cfg(test)]
mod tests;
