mod subcommands;


use crate::agent::build_handler;
use crate::bus::MessageBus;
use crate::channels::ChannelManager;
use crate::config::{Config, load_config};
use crate::providers::base::LLMProvider;
use crate::providers::ollama::OllamaProvider;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "ollacord")]
#[command(about = "Discord conversation agent backed by a local Ollama model")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Write the default configuration and create the workspace
    Onboard,
    /// Start the Discord bot
    Run {
        #[arg(long)]
        model: Option<String>,
    },
    /// Talk to the agent from the terminal
    Chat {
        #[arg(short, long)]
        message: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Load the model into server memory and wait for the first token
    Load {
        #[arg(long)]
        model: Option<String>,
    },
    /// Show what the model supports
    Capabilities {
        #[arg(long)]
        model: Option<String>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => onboard()?,
        Commands::Run { model } => serve(model).await?,
        Commands::Chat { message, model } => subcommands::chat(message, model).await?,
        Commands::Load { model } => subcommands::load(model).await?,
        Commands::Capabilities { model } => subcommands::capabilities(model).await?,
    }

    Ok(())
}

/// Load the configuration, applying a `--model` override.
fn load_with_model(model: Option<String>) -> Result<Config> {
    let mut config = load_config(None)?;
    if let Some(model) = model {
        config.ollama.model = model;
    }
    info!("using model {} at {}", config.ollama.model, config.ollama.url);
    Ok(config)
}

fn setup_provider(config: &Config) -> Arc<dyn LLMProvider> {
    Arc::new(OllamaProvider::new(&config.ollama))
}

fn onboard() -> Result<()> {
    println!("Initializing ollacord...");

    let config_path = crate::config::get_config_path()?;
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        println!("Overwrite? (y/N): ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            return Ok(());
        }
    }

    let config = Config::default();
    write_initial_setup(&config, &config_path)?;
    println!("Created config at {}", config_path.display());
    println!("Created workspace at {}", config.workspace_path().display());
    println!("\nNext steps:");
    println!("  1. Set discord.token (or OLLACORD_DISCORD_TOKEN) and discord.enabled");
    println!("  2. Pull the models: ollama pull {}", config.ollama.model);
    println!("     and: ollama pull {}", config.ollama.embed_model);
    println!("  3. Start the bot: ollacord run");
    Ok(())
}

/// Write `config` to `config_path` and create its workspace folders.
fn write_initial_setup(config: &Config, config_path: &Path) -> Result<()> {
    crate::config::save_config(config, Some(config_path))?;
    crate::utils::ensure_dir(config.workspace_path())?;
    crate::utils::ensure_dir(config.attachment_path())?;
    Ok(())
}

async fn serve(model: Option<String>) -> Result<()> {
    let config = load_with_model(model)?;
    let provider = setup_provider(&config);

    if config.ollama.load_model_on_start {
        if let Err(e) = provider.warmup(None).await {
            warn!("model warmup failed (non-fatal): {:#}", e);
        }
    }

    let bus = Arc::new(MessageBus::default());
    let outbound_rx = bus
        .take_outbound_rx()
        .ok_or_else(|| anyhow::anyhow!("outbound receiver already taken"))?;

    let handler = Arc::new(build_handler(&config, provider).await?.with_bus(bus.clone()));

    let mut channels = ChannelManager::new(&config, bus.clone());
    if channels.enabled_channels().is_empty() {
        anyhow::bail!("no channel enabled; set discord.enabled and discord.token in config.json");
    }
    channels.start_all().await?;
    let channels = Arc::new(channels);

    println!("ollacord running on {:?}", channels.enabled_channels());

    let mut agent_task = tokio::spawn(handler.run(bus.clone()));
    let mut outbound_task = {
        let channels = channels.clone();
        tokio::spawn(async move { channels.run_outbound(outbound_rx).await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        res = &mut agent_task => {
            match res {
                Ok(Err(e)) => warn!("agent task stopped: {:#}", e),
                Err(e) => warn!("agent task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = &mut outbound_task => {}
    }

    agent_task.abort();
    outbound_task.abort();
    let _ = outbound_task.await;
    shutdown_channels(channels).await;
    Ok(())
}

/// Disconnect every channel once nothing else holds the manager.
async fn shutdown_channels(channels: Arc<ChannelManager>) {
    match Arc::try_unwrap(channels) {
        Ok(mut channels) => {
            if let Err(e) = channels.stop_all().await {
                error!("Error stopping channels during shutdown: {}", e);
            }
        }
        Err(_) => debug!("channels still referenced at shutdown, dropping them"),
    }
}
