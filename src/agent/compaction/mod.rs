use crate::agent::context::{ContextStore, Turn};
use crate::providers::base::{ChatRequest, LLMProvider, Message};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a summarizer. Do not tell what you're about to do, summarize only.";

const SUMMARY_PROMPT: &str = "Summarize the following conversation in a concise but clear way.Keep important details, but remove fluff. Make it short enough to fit in one message.\n\n";

pub const SUMMARY_TAG: &str = "(Summary of earlier conversation)";

/// Compresses the oldest turns of a context into one synthetic system turn.
pub struct Summarizer {
    provider: Arc<dyn LLMProvider>,
    model: Option<String>,
    think: Option<bool>,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, model: Option<String>) -> Self {
        Self {
            provider,
            model,
            think: None,
        }
    }

    /// Explicitly disable reasoning for models that support it.
    #[must_use]
    pub fn with_thinking_support(mut self, supported: bool) -> Self {
        self.think = supported.then_some(false);
        self
    }

    /// Replace turns `[1, k]` with a single summary turn.
    ///
    /// `k` must be at least 1; config validation rejects
    /// `agent.summarizeCount = 0`, and a zero here returns `false` without
    /// calling the model. The same happens when the store holds `k + 1`
    /// turns or fewer. The store is only touched once the model has
    /// produced a non-empty summary.
    pub async fn summarize(&self, store: &mut ContextStore, k: usize) -> Result<bool> {
        let len = store.len();
        if k == 0 || len <= k + 1 {
            debug!("summarize: nothing to do (len={}, k={})", len, k);
            return Ok(false);
        }

        let turns = store.turns();
        let prefix = serde_json::to_string_pretty(&turns[1..=k])
            .context("failed to serialize turns for summarization")?;

        let response = self
            .provider
            .chat(ChatRequest {
                messages: vec![
                    Message::system(SUMMARIZER_SYSTEM_PROMPT),
                    Message::user(format!("{}{}", SUMMARY_PROMPT, prefix)),
                ],
                tools: None,
                model: self.model.as_deref(),
                think: self.think,
            })
            .await
            .context("summarization request failed")?;

        let Some(summary) = response.text() else {
            warn!("summarizer returned an empty summary, leaving context untouched");
            anyhow::bail!("summarization produced an empty summary");
        };

        let mut compacted = Vec::with_capacity(len - k + 1);
        compacted.push(turns[0].clone());
        compacted.push(Turn::system(format!("{}\n{}", SUMMARY_TAG, summary.trim())));
        compacted.extend_from_slice(&turns[k + 1..]);

        store.replace_all(compacted)?;
        info!("summarized {} turns, context now {} turns", k, store.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests;
