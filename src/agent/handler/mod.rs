use crate::agent::admission::AdmissionGate;
use crate::agent::agent_loop::{ChatOptions, ConversationEngine};
use crate::agent::compaction::Summarizer;
use crate::agent::context::{ContextStore, Role};
use crate::agent::memory::Memory;
use crate::agent::tools::ExecutionContext;
use crate::bus::{
    Attachment, InboundEvent, InboundMessage, MessageBus, OutboundEvent, OutboundMessage,
    ReactionEvent,
};
use crate::config::AgentConfig;
use crate::errors::OllacordResult;
use crate::utils::regex::RegexPatterns;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const SILENT_PREFIX: &str = "/silent";
const MEMORY_TAG: &str = "(Remembered from past conversations)";

#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub system_prompt: String,
    pub max_length: usize,
    pub summarize_count: usize,
    pub memory_recall: usize,
}

impl HandlerSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_length: config.max_length,
            summarize_count: config.summarize_count,
            memory_recall: config.memory_recall,
        }
    }
}

struct ConversationState {
    store: ContextStore,
    last_channel: Option<String>,
}

/// Entry point for everything the platform delivers.
///
/// The conversation lock is held for the whole of each message, so two
/// messages never interleave their turns.
pub struct ConversationHandler {
    engine: Arc<ConversationEngine>,
    gate: AdmissionGate,
    summarizer: Summarizer,
    memory: Arc<Memory>,
    settings: HandlerSettings,
    state: Mutex<ConversationState>,
    bus: Option<Arc<MessageBus>>,
}

impl ConversationHandler {
    pub fn new(
        engine: Arc<ConversationEngine>,
        summarizer: Summarizer,
        memory: Arc<Memory>,
        store: ContextStore,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            gate: AdmissionGate::new(engine.clone()),
            engine,
            summarizer,
            memory,
            settings,
            state: Mutex::new(ConversationState {
                store,
                last_channel: None,
            }),
            bus: None,
        }
    }

    /// Publish typing indicators on `bus` while replies are produced.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Run `f` against the conversation store under the conversation lock.
    pub async fn with_store<R>(&self, f: impl FnOnce(&ContextStore) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.store)
    }

    /// Process one inbound message. `None` means the bot stays silent.
    pub async fn handle(&self, msg: InboundMessage) -> OllacordResult<Option<String>> {
        if msg.content.starts_with(SILENT_PREFIX) {
            debug!("ignoring /silent message from {}", msg.author);
            return Ok(None);
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        state.store.set_system_prompt(&self.settings.system_prompt)?;

        if state.last_channel.as_deref() != Some(msg.channel_name.as_str()) {
            state
                .store
                .append(channel_notice(&msg), Role::System, Vec::new(), None)?;
            state.last_channel = Some(msg.channel_name.clone());
        }

        if state.store.len() > self.settings.max_length {
            if let Err(e) = self
                .summarizer
                .summarize(&mut state.store, self.settings.summarize_count)
                .await
            {
                warn!("summarization failed, keeping full context: {:#}", e);
            }
        }

        if !state.store.has_extra_value("user", &msg.author) {
            let memories = self
                .memory
                .recall(self.settings.memory_recall, &msg.author, &msg.content)
                .await;
            if !memories.is_empty() {
                info!("recalled {} memories for {}", memories.len(), msg.author);
                state.store.append(
                    format!("{} {}", MEMORY_TAG, memories.join("; ")),
                    Role::System,
                    Vec::new(),
                    None,
                )?;
            }
        }

        let content = replace_mentions(&msg);

        for attachment in &msg.attachments {
            record_attachment(&mut state.store, attachment, &msg.author)?;
        }

        if let Some(reply) = &msg.reply_to {
            for attachment in &reply.attachments {
                record_attachment(&mut state.store, attachment, &reply.author)?;
            }
            state.store.append(
                format!(
                    "{} replied to a message by {}: {}",
                    msg.author, reply.author, reply.content
                ),
                Role::User,
                Vec::new(),
                None,
            )?;
        }

        let prompt = format!(
            "{} - {}: {}",
            msg.timestamp.format("%H:%M"),
            msg.author,
            content
        );
        let ctx = ExecutionContext {
            channel: msg.channel.clone(),
            author: Some(msg.author.clone()),
        };

        if !msg.is_direct {
            let admitted = self
                .gate
                .should_respond(&state.store, &prompt, ctx.clone())
                .await?;
            if !admitted {
                return Ok(None);
            }
        }

        self.typing(&msg).await;
        let extra = format!("user, {}", msg.author);
        let outcome = self
            .engine
            .chat(
                &mut state.store,
                &prompt,
                ChatOptions {
                    extra: Some(&extra),
                    ctx,
                    ..Default::default()
                },
            )
            .await?;
        Ok(outcome.into_reply())
    }

    /// Record a reaction as a system note. Nothing is sent back.
    pub async fn handle_reaction(&self, reaction: &ReactionEvent) -> OllacordResult<()> {
        let mut state = self.state.lock().await;
        state.store.append(
            format!(
                "{} reacted with {} to message: {}",
                reaction.user, reaction.emoji, reaction.content
            ),
            Role::System,
            Vec::new(),
            None,
        )
    }

    /// Consume inbound events until the bus closes, publishing replies.
    pub async fn run(self: Arc<Self>, bus: Arc<MessageBus>) -> anyhow::Result<()> {
        let mut rx = bus
            .take_inbound_rx()
            .ok_or_else(|| anyhow::anyhow!("inbound receiver already taken"))?;
        info!("agent task started");

        while let Some(event) = rx.recv().await {
            match event {
                InboundEvent::Message(msg) => {
                    let channel = msg.channel.clone();
                    let chat_id = msg.chat_id.clone();
                    let session = msg.session_key();
                    debug!("message from {} in {}", msg.author, session);
                    match self.handle(msg).await {
                        Ok(Some(content)) => {
                            let reply = OutboundEvent::Message(OutboundMessage {
                                channel,
                                chat_id,
                                content,
                            });
                            if let Err(e) = bus.publish_outbound(reply).await {
                                error!("failed to publish reply: {:#}", e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!("failed to handle message in {}: {}", session, e),
                    }
                }
                InboundEvent::Reaction(reaction) => {
                    if let Err(e) = self.handle_reaction(&reaction).await {
                        error!("failed to record reaction: {}", e);
                    }
                }
            }
        }

        info!("inbound queue closed, agent task stopping");
        Ok(())
    }

    async fn typing(&self, msg: &InboundMessage) {
        let Some(bus) = &self.bus else {
            return;
        };
        let event = OutboundEvent::Typing {
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
        };
        if let Err(e) = bus.publish_outbound(event).await {
            debug!("typing indicator dropped: {}", e);
        }
    }
}

fn channel_notice(msg: &InboundMessage) -> String {
    let topic = msg.topic.as_deref().unwrap_or("No description");
    match &msg.guild {
        Some(guild) => format!(
            "Now in {}, {} channel. Description: {}",
            guild, msg.channel_name, topic
        ),
        None => format!(
            "Now in {} channel. Description: {}",
            msg.channel_name, topic
        ),
    }
}

/// Replace raw `<@id>` mentions with `@name`. Unknown ids are left alone.
pub fn replace_mentions(msg: &InboundMessage) -> String {
    if msg.mentions.is_empty() {
        return msg.content.clone();
    }
    RegexPatterns::discord_mention()
        .replace_all(&msg.content, |caps: &regex::Captures| {
            msg.mentions
                .iter()
                .find(|m| m.id == caps[1])
                .map_or_else(|| caps[0].to_string(), |m| format!("@{}", m.name))
        })
        .into_owned()
}

/// Append a user turn describing `attachment`. Unreadable files are skipped.
fn record_attachment(
    store: &mut ContextStore,
    attachment: &Attachment,
    author: &str,
) -> OllacordResult<()> {
    if attachment.is_image() {
        let path = attachment.path.to_string_lossy().into_owned();
        return store.append(
            format!("Image uploaded by {}.", author),
            Role::User,
            vec![path],
            None,
        );
    }

    if attachment.is_text() {
        let bytes = match std::fs::read(&attachment.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "could not read attachment {}: {}",
                    attachment.path.display(),
                    e
                );
                return Ok(());
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        return store.append(
            format!("File uploaded by {}:\n{}", author, text),
            Role::User,
            Vec::new(),
            None,
        );
    }

    store.append(
        format!(
            "File uploaded by {}: {} (unsupported format)",
            author, attachment.filename
        ),
        Role::User,
        Vec::new(),
        None,
    )
}
