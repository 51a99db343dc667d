use super::{load_with_model, setup_provider};
use crate::agent::{ConversationHandler, build_handler};
use crate::bus::InboundMessage;
use anyhow::Result;

const CLI_AUTHOR: &str = "user";

pub(super) async fn chat(message: Option<String>, model: Option<String>) -> Result<()> {
    let config = load_with_model(model)?;
    let provider = setup_provider(&config);
    let handler = build_handler(&config, provider).await?;

    if let Some(msg) = message {
        print_reply(&handler, &msg).await?;
    } else {
        interactive_repl(&handler).await?;
    }
    Ok(())
}

async fn print_reply(handler: &ConversationHandler, input: &str) -> Result<()> {
    let msg = InboundMessage::direct("cli", "local", CLI_AUTHOR, input);
    match handler.handle(msg).await? {
        Some(reply) => println!("{}", reply),
        None => println!("(no reply)"),
    }
    Ok(())
}

async fn interactive_repl(handler: &ConversationHandler) -> Result<()> {
    use std::io::{self, BufRead, Write};

    println!("Interactive mode (Ctrl+D to exit)\n");
    let stdin = io::stdin();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!();
            return Ok(());
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Err(e) = print_reply(handler, input).await {
            println!("Error: {:#}", e);
        }
        println!();
    }
}

pub(super) async fn load(model: Option<String>) -> Result<()> {
    let config = load_with_model(model)?;
    let provider = setup_provider(&config);
    provider.warmup(None).await?;
    println!("Model {} is loaded", config.ollama.model);
    Ok(())
}

pub(super) async fn capabilities(model: Option<String>) -> Result<()> {
    let config = load_with_model(model)?;
    let provider = setup_provider(&config);
    let caps = provider.capabilities(None).await?;
    if caps.is_empty() {
        println!("{}: no capabilities reported", config.ollama.model);
    } else {
        println!("{}: {}", config.ollama.model, caps.join(", "));
    }
    Ok(())
}
