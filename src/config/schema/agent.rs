use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a friendly member of a Discord community. Talk like one: short, casual and aware of what was said before.

Messages reach you as \"HH:MM - username: content\". Answer with the message text only, never with a name or timestamp prefix.

Style:
- Keep it to one to four short sentences and match the language the user writes in.
- Contractions, light slang and the odd emoji are welcome. Long formal paragraphs are not.

Tools:
- browse: look up anything recent or niche instead of guessing, and mention \"(searched)\" when you did.
- gif: send one now and then when it helps the mood.
- python: do maths or data work. Only what the script prints comes back to you, e.g. `print(5 + 3)`.
- memorize: store details people share about themselves (name, likes, plans) and bring them up naturally later.

If you are not sure about something, say so and offer to search.";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_length() -> usize {
    40
}

fn default_summarize_count() -> usize {
    15
}

fn default_retry_budget() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_memory_recall() -> usize {
    5
}

fn default_workspace() -> String {
    "~/.ollacord/workspace".to_string()
}

fn default_attachment_folder() -> String {
    "attachments".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt", rename = "systemPrompt")]
    pub system_prompt: String,
    /// Context length (in turns) above which the oldest turns get summarized.
    #[serde(default = "default_max_length", rename = "maxLength")]
    pub max_length: usize,
    #[serde(default = "default_summarize_count", rename = "summarizeCount")]
    pub summarize_count: usize,
    /// Retries allowed on transient upstream failures (attempts = budget + 1).
    #[serde(default = "default_retry_budget", rename = "retryBudget")]
    pub retry_budget: u32,
    #[serde(default = "default_retry_delay_ms", rename = "retryDelayMs")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_memory_recall", rename = "memoryRecall")]
    pub memory_recall: usize,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_attachment_folder", rename = "attachmentFolder")]
    pub attachment_folder: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_length: default_max_length(),
            summarize_count: default_summarize_count(),
            retry_budget: default_retry_budget(),
            retry_delay_ms: default_retry_delay_ms(),
            memory_recall: default_memory_recall(),
            workspace: default_workspace(),
            attachment_folder: default_attachment_folder(),
        }
    }
}
