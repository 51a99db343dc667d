pub mod admission;
#[path = "loop/mod.rs"]
pub mod agent_loop;
pub mod compaction;
pub mod context;
pub mod handler;
pub mod memory;
pub mod response_log;
pub mod tools;

pub use agent_loop::{ChatOptions, ChatOutcome, ConversationEngine, EngineConfig, ThinkMode};
pub use handler::{ConversationHandler, HandlerSettings};

use crate::config::Config;
use crate::providers::base::LLMProvider;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Wire the store, memory, tools and engine for `config` around `provider`.
pub async fn build_handler(
    config: &Config,
    provider: Arc<dyn LLMProvider>,
) -> Result<ConversationHandler> {
    let workspace = crate::utils::ensure_dir(config.workspace_path())?;
    crate::utils::ensure_dir(config.attachment_path())?;
    info!("workspace: {}", workspace.display());

    let model = config.ollama.model.clone();
    let supports_thinking =
        ConversationEngine::probe_thinking_support(provider.as_ref(), Some(&model)).await;

    let memory = Arc::new(
        memory::Memory::open(
            memory::MemoryStore::new(config.memory_path()),
            memory::MemoryIndex::new(provider.clone(), config.ollama.embed_model.clone()),
        )
        .await
        .context("failed to open memory store")?,
    );

    let tools = Arc::new(tools::build_registry(&config.tools, memory.clone()));
    let log = Arc::new(response_log::ResponseLog::open(config.log_path()));
    let engine = Arc::new(ConversationEngine::new(
        provider.clone(),
        tools,
        log,
        EngineConfig::from_config(config, supports_thinking),
    ));

    let store = context::ContextStore::restore(config.context_path(), &config.agent.system_prompt)?;
    info!("context restored: {} turns", store.len());

    let summarizer = compaction::Summarizer::new(provider, Some(model))
        .with_thinking_support(supports_thinking);

    Ok(ConversationHandler::new(
        engine,
        summarizer,
        memory,
        store,
        HandlerSettings::from_config(&config.agent),
    ))
}
