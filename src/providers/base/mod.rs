use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Thinking output from reasoning models (qwen3, deepseek-r1, ...)
    pub reasoning_content: Option<String>,
    /// `prompt_eval_count` and `eval_count`, when the server reports them
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    /// Response body exactly as the server returned it, for the response log.
    pub raw: Option<Value>,
}

impl LLMResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Content that is present and not blank. Thinking models sometimes
    /// return `""` alongside tool calls.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
    /// Base64-encoded images attached to this message
    pub images: Vec<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema
}

/// Parameters for a chat request to an LLM provider.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest<'a> {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub model: Option<&'a str>,
    /// Reasoning toggle. `None` leaves the field out of the request, which
    /// is required for models without the `thinking` capability.
    pub think: Option<bool>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse>;

    fn default_model(&self) -> &str;

    /// Get the model into memory before the first real request.
    /// Default is a no-op.
    async fn warmup(&self, _model: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Capabilities advertised for a model (`completion`, `tools`, `thinking`, `vision`, ...).
    async fn capabilities(&self, _model: Option<&str>) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Embed each input with the given embedding model.
    async fn embed(&self, _model: &str, _inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embeddings are not supported by this provider")
    }
}
