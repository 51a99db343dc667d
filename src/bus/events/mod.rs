use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file attached to a message, already saved to disk by the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub path: PathBuf,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        if let Some(ct) = &self.content_type {
            return ct.starts_with("image/");
        }
        matches!(
            self.extension().as_deref(),
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp")
        )
    }

    /// Whether the attachment can be read back as text.
    pub fn is_text(&self) -> bool {
        if let Some(ct) = &self.content_type {
            let ct = ct.split(';').next().unwrap_or_default().trim();
            if ct.starts_with("text/")
                || matches!(
                    ct,
                    "application/json" | "application/xml" | "application/x-yaml"
                )
            {
                return true;
            }
        }
        matches!(
            self.extension().as_deref(),
            Some(
                "txt" | "md" | "csv" | "json" | "xml" | "yaml" | "yml" | "toml" | "log" | "py"
                    | "rs" | "js" | "ts" | "html" | "css" | "c" | "cpp" | "h" | "java" | "sh"
            )
        )
    }

    fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// A user mention as it appears in raw content (`<@id>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub name: String,
}

/// The message an inbound message replies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub author: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Source channel (`discord`, `cli`)
    pub channel: String,
    pub chat_id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    /// Direct messages skip the admission gate.
    pub is_direct: bool,
    pub guild: Option<String>,
    pub channel_name: String,
    pub topic: Option<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<ReplyRef>,
}

impl InboundMessage {
    /// A direct message with no attachments, mentions or reply.
    pub fn direct(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            author: author.into(),
            content: content.into(),
            timestamp: Local::now(),
            is_direct: true,
            guild: None,
            channel_name: "Direct Message".to_string(),
            topic: None,
            mentions: Vec::new(),
            attachments: Vec::new(),
            reply_to: None,
        }
    }

    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub channel: String,
    pub chat_id: String,
    pub user: String,
    pub emoji: String,
    /// Content of the message that was reacted to
    pub content: String,
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(InboundMessage),
    Reaction(ReactionEvent),
}

impl InboundEvent {
    pub fn channel(&self) -> &str {
        match self {
            Self::Message(m) => &m.channel,
            Self::Reaction(r) => &r.channel,
        }
    }

    /// Who triggered the event, for rate limiting.
    pub fn sender(&self) -> &str {
        match self {
            Self::Message(m) => &m.author,
            Self::Reaction(r) => &r.user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Message(OutboundMessage),
    /// Show a typing indicator while a reply is produced.
    Typing { channel: String, chat_id: String },
}

impl OutboundEvent {
    pub fn channel(&self) -> &str {
        match self {
            Self::Message(m) => &m.channel,
            Self::Typing { channel, .. } => channel,
        }
    }
}
