use crate::agent::context::{ContextStore, Role};
use crate::agent::response_log::ResponseLog;
use crate::agent::tools::{ExecutionContext, ToolRegistry};
use crate::config::Config;
use crate::errors::{OllacordError, OllacordResult};
use crate::providers::base::{
    ChatRequest, LLMProvider, LLMResponse, ToolCallRequest, ToolDefinition,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reply sent when every attempt hit a transient upstream failure.
pub const APOLOGY: &str = "couldn't generate the message. Please retry later.";

const DEFAULT_RETRY_BUDGET: u32 = 5;
const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

/// Reasoning toggle for a single `chat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkMode {
    /// Off for the first request, on once tool results are in the context.
    #[default]
    Auto,
    On,
    Off,
}

/// Per-call options for [`ConversationEngine::chat`].
#[derive(Debug, Clone)]
pub struct ChatOptions<'a> {
    pub role: Role,
    pub think: ThinkMode,
    /// Extra field in `"key, value"` form stored on the inbound turn
    pub extra: Option<&'a str>,
    /// Image paths attached to the inbound turn
    pub images: Vec<String>,
    /// Replaces the built-in tool set. Calls against it are returned, not executed.
    pub custom_tools: Option<Vec<ToolDefinition>>,
    pub ctx: ExecutionContext,
}

impl Default for ChatOptions<'_> {
    fn default() -> Self {
        Self {
            role: Role::User,
            think: ThinkMode::Auto,
            extra: None,
            images: Vec::new(),
            custom_tools: None,
            ctx: ExecutionContext::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// The model answered in text; the answer is already in the context.
    Final(String),
    /// The model called a custom tool. Nothing was executed.
    ToolCalls(Vec<ToolCallRequest>),
    /// The retry budget ran out on transient upstream failures.
    Exhausted,
}

impl ChatOutcome {
    /// Text to send back to the user, if any.
    pub fn into_reply(self) -> Option<String> {
        match self {
            Self::Final(text) => Some(text),
            Self::Exhausted => Some(APOLOGY.to_string()),
            Self::ToolCalls(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: Option<String>,
    /// Retries allowed after the first attempt
    pub retry_budget: u32,
    pub retry_delay: Duration,
    /// Whether the model accepts the `think` field at all
    pub supports_thinking: bool,
    /// Model round-trips allowed for tool execution before giving up
    pub max_tool_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_delay: Duration::ZERO,
            supports_thinking: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config, supports_thinking: bool) -> Self {
        Self {
            model: Some(config.ollama.model.clone()),
            retry_budget: config.agent.retry_budget,
            retry_delay: Duration::from_millis(config.agent.retry_delay_ms),
            supports_thinking,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Drives one inbound message through model requests and tool calls until
/// the model answers in text.
pub struct ConversationEngine {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    log: Arc<ResponseLog>,
    config: EngineConfig,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        log: Arc<ResponseLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            log,
            config,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ask the server whether `model` advertises the `thinking` capability.
    /// Unknown means no, so the `think` field is never sent blindly.
    pub async fn probe_thinking_support(provider: &dyn LLMProvider, model: Option<&str>) -> bool {
        match provider.capabilities(model).await {
            Ok(caps) => {
                let supported = caps.iter().any(|c| c == "thinking");
                info!(
                    "model capabilities: [{}] (thinking={})",
                    caps.join(", "),
                    supported
                );
                supported
            }
            Err(e) => {
                warn!("capability query failed, assuming no thinking support: {}", e);
                false
            }
        }
    }

    /// Append `content` to `store` and run the model until it answers.
    ///
    /// The inbound turn is appended exactly once, before the first request.
    /// Transient upstream failures are retried up to the retry budget;
    /// any other failure is returned as an error.
    pub async fn chat(
        &self,
        store: &mut ContextStore,
        content: &str,
        opts: ChatOptions<'_>,
    ) -> OllacordResult<ChatOutcome> {
        let ChatOptions {
            role,
            think,
            extra,
            images,
            custom_tools,
            ctx,
        } = opts;

        store.append(content, role, images, extra)?;

        let custom = custom_tools.is_some();
        let tools = custom_tools.unwrap_or_else(|| self.tools.get_tool_definitions());
        let mut retries_left = self.config.retry_budget;
        let mut tools_ran = false;
        let mut tool_rounds = 0usize;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let think_flag = match think {
                ThinkMode::Auto => tools_ran,
                ThinkMode::On => true,
                ThinkMode::Off => false,
            };
            let req = ChatRequest {
                messages: store.to_messages(),
                tools: (!tools.is_empty()).then(|| tools.clone()),
                model: self.config.model.as_deref(),
                think: self.config.supports_thinking.then_some(think_flag),
            };
            debug!(
                "model request #{}: {} turns, {} tools, think={:?}",
                attempt,
                store.len(),
                tools.len(),
                req.think
            );

            let response = match self.provider.chat(req).await {
                Ok(response) => response,
                Err(e) => {
                    let err = OllacordError::from_anyhow(e);
                    if !err.is_retryable() {
                        warn!("model request failed: {}", err);
                        return Err(err);
                    }
                    if retries_left == 0 {
                        warn!("{} after {} attempts, giving up", err, attempt);
                        return Ok(ChatOutcome::Exhausted);
                    }
                    retries_left -= 1;
                    warn!(
                        "{} on attempt {}, retrying ({} retries left)",
                        err, attempt, retries_left
                    );
                    if !self.config.retry_delay.is_zero() {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                    continue;
                }
            };

            self.log.record(&log_entry(&response));
            if let (Some(prompt), Some(generated)) = (response.input_tokens, response.output_tokens)
            {
                debug!("model reply: {} prompt tokens, {} generated", prompt, generated);
            }

            if let Some(text) = response.text() {
                let text = text.to_string();
                store.append(text.clone(), Role::Assistant, Vec::new(), None)?;
                return Ok(ChatOutcome::Final(text));
            }

            if !response.has_tool_calls() {
                return Err(OllacordError::Protocol(
                    "model response had neither content nor tool calls".to_string(),
                ));
            }

            if custom {
                debug!("returning {} custom tool calls", response.tool_calls.len());
                return Ok(ChatOutcome::ToolCalls(response.tool_calls));
            }

            tool_rounds += 1;
            if tool_rounds > self.config.max_tool_rounds {
                return Err(OllacordError::Protocol(format!(
                    "model kept calling tools after {} rounds",
                    self.config.max_tool_rounds
                )));
            }

            for call in response.tool_calls {
                info!("tool call: {}", call.name);
                let output = match self.tools.execute(&call.name, call.arguments, &ctx).await {
                    Ok(result) => result.content,
                    Err(e) => format!("Error: {}", e),
                };
                store.append(output, Role::Tool, Vec::new(), None)?;
            }
            tools_ran = true;
        }
    }
}

/// Raw server body when available, otherwise a reconstruction of it.
fn log_entry(response: &LLMResponse) -> Value {
    response.raw.clone().unwrap_or_else(|| {
        json!({
            "message": {
                "role": "assistant",
                "content": response.content,
                "thinking": response.reasoning_content,
                "tool_calls": response
                    .tool_calls
                    .iter()
                    .map(|c| json!({"function": {"name": c.name, "arguments": c.arguments}}))
                    .collect::<Vec<_>>(),
            }
        })
    })
}

#[cfg(test)]
mod tests;
