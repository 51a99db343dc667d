use crate::bus::{
    Attachment, InboundEvent, InboundMessage, Mention, MessageBus, OutboundMessage, ReactionEvent,
    ReplyRef,
};
use crate::channels::base::{BaseChannel, split_message};
use crate::config::DiscordConfig;
use crate::utils::safe_filename;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::Local;
use serenity::async_trait as serenity_async_trait;
use serenity::http::Http;
use serenity::model::channel::{Attachment as DiscordAttachment, Channel, Message, Reaction};
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MESSAGE_LIMIT: usize = 2000;
const DM_CHANNEL_NAME: &str = "Direct Message";

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGE_REACTIONS
}

/// Where attachment `id` called `filename` is saved. The id prefix keeps
/// same-named uploads from overwriting each other.
pub fn attachment_path(dir: &Path, id: impl std::fmt::Display, filename: &str) -> PathBuf {
    dir.join(format!("{}_{}", id, safe_filename(filename)))
}

struct Handler {
    bus: Arc<MessageBus>,
    attachment_dir: PathBuf,
}

impl Handler {
    async fn save_attachments(&self, attachments: &[DiscordAttachment]) -> Vec<Attachment> {
        let mut saved = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            match self.save_attachment(attachment).await {
                Ok(a) => saved.push(a),
                Err(e) => tracing::warn!(
                    "failed to save Discord attachment {}: {:#}",
                    attachment.filename,
                    e
                ),
            }
        }
        saved
    }

    async fn save_attachment(&self, attachment: &DiscordAttachment) -> Result<Attachment> {
        let bytes = attachment.download().await.context("download failed")?;
        let path = attachment_path(&self.attachment_dir, attachment.id, &attachment.filename);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(Attachment {
            filename: attachment.filename.clone(),
            path,
            content_type: attachment.content_type.clone(),
        })
    }

    async fn to_inbound(&self, ctx: &Context, msg: &Message) -> InboundMessage {
        let (channel_name, topic) = match msg.channel(ctx).await {
            Ok(Channel::Guild(gc)) => (gc.name.clone(), gc.topic.clone()),
            Ok(_) => (DM_CHANNEL_NAME.to_string(), None),
            Err(e) => {
                tracing::debug!("could not resolve Discord channel {}: {}", msg.channel_id, e);
                (DM_CHANNEL_NAME.to_string(), None)
            }
        };

        let guild = match msg.guild_id {
            Some(gid) => {
                let cached = ctx.cache.guild(gid).map(|g| g.name.clone());
                match cached {
                    Some(name) => Some(name),
                    None => gid.to_partial_guild(&ctx.http).await.ok().map(|g| g.name),
                }
            }
            None => None,
        };

        let reply_to = match &msg.referenced_message {
            Some(replied) => Some(ReplyRef {
                author: replied.author.name.clone(),
                content: replied.content.clone(),
                attachments: self.save_attachments(&replied.attachments).await,
            }),
            None => None,
        };

        InboundMessage {
            channel: "discord".to_string(),
            chat_id: msg.channel_id.to_string(),
            author: msg.author.name.clone(),
            content: msg.content.clone(),
            timestamp: Local::now(),
            is_direct: msg.guild_id.is_none(),
            guild,
            channel_name,
            topic,
            mentions: msg
                .mentions
                .iter()
                .map(|u| Mention {
                    id: u.id.to_string(),
                    name: u.name.clone(),
                })
                .collect(),
            attachments: self.save_attachments(&msg.attachments).await,
            reply_to,
        }
    }
}

#[serenity_async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        let inbound = self.to_inbound(&ctx, &msg).await;
        if let Err(e) = self.bus.publish_inbound(InboundEvent::Message(inbound)).await {
            tracing::error!("Failed to queue Discord message: {}", e);
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let own_id = ctx.cache.current_user().id;
        if reaction.user_id == Some(own_id) {
            return;
        }

        let user = match reaction.user(&ctx).await {
            Ok(user) => user.name,
            Err(e) => {
                tracing::warn!("could not resolve reacting user: {}", e);
                return;
            }
        };
        let content = match reaction.message(&ctx).await {
            Ok(message) => message.content,
            Err(e) => {
                tracing::warn!("could not fetch reacted message: {}", e);
                return;
            }
        };

        let event = InboundEvent::Reaction(ReactionEvent {
            channel: "discord".to_string(),
            chat_id: reaction.channel_id.to_string(),
            user,
            emoji: reaction.emoji.to_string(),
            content,
        });
        if let Err(e) = self.bus.publish_inbound(event).await {
            tracing::error!("Failed to queue Discord reaction: {}", e);
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        tracing::info!(
            "Discord bot connected as {} (id: {})",
            ready.user.name,
            ready.user.id
        );
    }
}

pub struct DiscordChannel {
    config: DiscordConfig,
    bus: Arc<MessageBus>,
    attachment_dir: PathBuf,
    http: Arc<Http>,
    client_handle: Option<tokio::task::JoinHandle<()>>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig, bus: Arc<MessageBus>, attachment_dir: PathBuf) -> Self {
        let http = Arc::new(Http::new(&config.token));
        Self {
            config,
            bus,
            attachment_dir,
            http,
            client_handle: None,
        }
    }
}

fn parse_channel_id(chat_id: &str) -> Result<ChannelId> {
    let id = chat_id
        .parse::<u64>()
        .map_err(|e| anyhow::anyhow!("Invalid Discord channel_id '{}': {}", chat_id, e))?;
    if id == 0 {
        anyhow::bail!("Invalid Discord channel_id '0'");
    }
    Ok(ChannelId::new(id))
}

#[async_trait]
impl BaseChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn start(&mut self) -> Result<()> {
        if self.config.token.is_empty() {
            return Err(anyhow::anyhow!("Discord token is empty"));
        }
        crate::utils::ensure_dir(&self.attachment_dir)?;

        let handler = Handler {
            bus: self.bus.clone(),
            attachment_dir: self.attachment_dir.clone(),
        };

        tracing::info!("Connecting to Discord gateway...");
        let mut client = Client::builder(&self.config.token, intents())
            .event_handler(handler)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create Discord client: {}", e))?;

        let shard_manager = client.shard_manager.clone();
        let handle = tokio::spawn(async move {
            if let Err(why) = client.start().await {
                tracing::error!("Discord client connection error: {:?}", why);
                shard_manager.shutdown_all().await;
            }
        });
        self.client_handle = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.client_handle.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> Result<()> {
        parse_channel_id(chat_id)?
            .broadcast_typing(&self.http)
            .await?;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        if msg.channel != "discord" {
            return Ok(());
        }
        let channel_id = parse_channel_id(&msg.chat_id)?;
        for chunk in split_message(&msg.content, MESSAGE_LIMIT) {
            channel_id
                .say(&self.http, &chunk)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to send Discord message: {}", e))?;
        }
        Ok(())
    }
}
