pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    AgentConfig, BrowseConfig, Config, DEFAULT_SYSTEM_PROMPT, DiscordConfig, GifConfig,
    OllamaConfig, SandboxConfig, ScriptConfig, ToolsConfig,
};
