use crate::agent::agent_loop::{ChatOptions, ChatOutcome, ConversationEngine, ThinkMode};
use crate::agent::context::{ContextStore, Turn};
use crate::agent::tools::ExecutionContext;
use crate::errors::OllacordResult;
use crate::providers::base::{ToolCallRequest, ToolDefinition};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

pub const GATE_TOOL_NAME: &str = "MultiPartyConversationAgent";

pub const GATE_SYSTEM_PROMPT: &str = "You're a Multi-Party Conversation Agent. Decide if you should reply to the user or not based on the conversation context. Always reply using tool_calls with the proper JSON structure: State_of_Mind, Semantic Understanding, Agent Action Modeling, and Action.";

/// Decides whether the bot should answer a message in a group channel.
///
/// The gate never touches the real conversation. It renders the history
/// into a throwaway in-memory store and asks the model for a structured
/// decision against it.
pub struct AdmissionGate {
    engine: Arc<ConversationEngine>,
}

impl AdmissionGate {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self { engine }
    }

    pub fn schema() -> ToolDefinition {
        ToolDefinition {
            name: GATE_TOOL_NAME.to_string(),
            description: "Define if the message requires a response from another user or bot in the conversation.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "State of Mind": {
                        "type": "string",
                        "description": "emotion recognition, participants’s engagement detection, personality identification, and recognition for each users intents in the conversation."
                    },
                    "Semantic Understanding": {
                        "type": "string",
                        "description": "dialogue summarization, conversation disentanglement, discourse structure analysis, and representation learning. For each participant and their replies in the conversation."
                    },
                    "Agent Action Modeling": {
                        "type": "string",
                        "description": "turn detection, addressee selection, and response selection/generation. For each participant in the conversation."
                    },
                    "Action": {
                        "type": "boolean",
                        "description": "True if the model is required to respond, False otherwise"
                    }
                },
                "required": [
                    "State of Mind",
                    "Semantic Understanding",
                    "Agent Action Modeling",
                    "Action"
                ]
            }),
        }
    }

    /// Ask the model whether `prompt` deserves a reply given `real`.
    ///
    /// `Ok(false)` is a deliberate silence. Non-retryable upstream failures
    /// come back as errors.
    pub async fn should_respond(
        &self,
        real: &ContextStore,
        prompt: &str,
        ctx: ExecutionContext,
    ) -> OllacordResult<bool> {
        let history = real.history_json()?;
        let mut scratch =
            ContextStore::in_memory(vec![Turn::system(GATE_SYSTEM_PROMPT), Turn::user(history)])?;

        let outcome = self
            .engine
            .chat(
                &mut scratch,
                prompt,
                ChatOptions {
                    think: ThinkMode::Off,
                    custom_tools: Some(vec![Self::schema()]),
                    ctx,
                    ..Default::default()
                },
            )
            .await?;

        let admitted = match outcome {
            ChatOutcome::ToolCalls(calls) => decision(&calls).unwrap_or(false),
            ChatOutcome::Final(text) => {
                debug!("gate answered in text instead of deciding: {}", text);
                false
            }
            ChatOutcome::Exhausted => false,
        };
        info!("admission gate: {}", if admitted { "reply" } else { "stay silent" });
        Ok(admitted)
    }
}

/// `Action` flag of the last call, if it can be read as a boolean.
pub fn decision(calls: &[ToolCallRequest]) -> Option<bool> {
    let action = calls.last()?.arguments.get("Action")?;
    match action {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
