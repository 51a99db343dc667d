use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`: printed normally via `&self.field_name`
/// - `redact(field_name)`: a `String` field shown as `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// Declared after the macro so they can use `redact_debug!`
mod agent;
mod discord;
mod ollama;
mod tools;

pub use agent::*;
pub use discord::*;
pub use ollama::*;
pub use tools::*;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    pub fn workspace_path(&self) -> PathBuf {
        crate::utils::get_workspace_path(&self.agent.workspace)
    }

    pub fn context_path(&self) -> PathBuf {
        self.workspace_path().join("context.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.workspace_path().join("logs.json")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.workspace_path().join("data.csv")
    }

    pub fn attachment_path(&self) -> PathBuf {
        self.workspace_path().join(&self.agent.attachment_folder)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), crate::errors::OllacordError> {
        self.validate_agent()?;
        self.validate_ollama()?;
        self.validate_tools()?;
        Ok(())
    }

    fn validate_agent(&self) -> Result<(), crate::errors::OllacordError> {
        use crate::errors::OllacordError;
        let a = &self.agent;

        if a.system_prompt.trim().is_empty() {
            return Err(OllacordError::Config(
                "agent.systemPrompt must not be empty".into(),
            ));
        }
        if a.summarize_count == 0 {
            return Err(OllacordError::Config(
                "agent.summarizeCount must be > 0".into(),
            ));
        }
        // Summarizing k turns needs at least k + 2 turns to do anything
        if a.max_length < a.summarize_count + 1 {
            return Err(OllacordError::Config(format!(
                "agent.maxLength ({}) must be at least agent.summarizeCount + 1 ({})",
                a.max_length,
                a.summarize_count + 1
            )));
        }
        if a.retry_budget > 50 {
            return Err(OllacordError::Config(
                "agent.retryBudget is unreasonably large (> 50)".into(),
            ));
        }
        if a.attachment_folder.is_empty()
            || a.attachment_folder.contains("..")
            || a.attachment_folder.starts_with('/')
        {
            return Err(OllacordError::Config(
                "agent.attachmentFolder must be a relative folder name inside the workspace"
                    .into(),
            ));
        }
        Ok(())
    }

    fn validate_ollama(&self) -> Result<(), crate::errors::OllacordError> {
        use crate::errors::OllacordError;
        let o = &self.ollama;

        if !(o.url.starts_with("http://") || o.url.starts_with("https://")) {
            return Err(OllacordError::Config(format!(
                "ollama.url must start with http:// or https:// (got '{}')",
                o.url
            )));
        }
        if o.model.trim().is_empty() {
            return Err(OllacordError::Config("ollama.model must not be empty".into()));
        }
        if o.embed_model.trim().is_empty() {
            return Err(OllacordError::Config(
                "ollama.embedModel must not be empty".into(),
            ));
        }
        if o.request_timeout_secs == 0 {
            return Err(OllacordError::Config(
                "ollama.requestTimeoutSecs must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_tools(&self) -> Result<(), crate::errors::OllacordError> {
        use crate::errors::OllacordError;
        let t = &self.tools;

        if t.browse.max_chars == 0 {
            return Err(OllacordError::Config(
                "tools.browse.maxChars must be > 0".into(),
            ));
        }
        if t.browse.max_results == 0 || t.browse.max_results > 25 {
            return Err(OllacordError::Config(
                "tools.browse.maxResults must be between 1 and 25".into(),
            ));
        }
        if t.gif.limit == 0 || t.gif.limit > 50 {
            return Err(OllacordError::Config(
                "tools.gif.limit must be between 1 and 50".into(),
            ));
        }
        if t.script.enabled {
            if t.script.timeout_secs == 0 {
                return Err(OllacordError::Config(
                    "tools.script.timeoutSecs must be > 0".into(),
                ));
            }
            if t.script.interpreter.trim().is_empty() {
                return Err(OllacordError::Config(
                    "tools.script.interpreter must not be empty".into(),
                ));
            }
            if !t.script.sandbox.enabled {
                warn!("tools.script.sandbox is disabled; scripts run with only process isolation");
            }
        }
        if t.gif.api_key.is_empty() {
            warn!("tools.gif.apiKey is empty; the gif tool will report an error until it is set");
        }
        Ok(())
    }
}
