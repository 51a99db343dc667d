use crate::errors::{OllacordError, OllacordResult};
use crate::providers::base::Message;
use crate::utils::atomic_write;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DISCONNECTED_PREFIX: &str = "You've been disconnected";

/// Keys owned by `Turn` itself. An extra field may not shadow them.
const RESERVED_KEYS: [&str; 3] = ["role", "content", "images"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message in the conversation buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Paths of images attached to this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Convert to a provider message, inlining images as base64.
    ///
    /// Images that can no longer be read are skipped.
    pub fn to_message(&self) -> Message {
        let images = self
            .images
            .iter()
            .filter_map(|path| match fs::read(path) {
                Ok(bytes) => Some(BASE64.encode(bytes)),
                Err(e) => {
                    warn!("skipping unreadable image {}: {}", path, e);
                    None
                }
            })
            .collect();
        Message {
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
            images,
        }
    }
}

/// Parse a `"key, value"` extra field. Splits on the first comma.
pub fn parse_extra_field(raw: &str) -> OllacordResult<(String, String)> {
    let Some((key, value)) = raw.split_once(',') else {
        return Err(OllacordError::Format(format!(
            "extra field must look like `key, value`, got {:?}",
            raw
        )));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(OllacordError::Format(format!(
            "extra field has an empty key: {:?}",
            raw
        )));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(OllacordError::Format(format!(
            "extra field key `{}` is reserved",
            key
        )));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Ordered, durably mirrored sequence of turns for one conversation.
///
/// Turn 0 is always a system turn. Every mutation rewrites the whole
/// snapshot through `atomic_write`, so a crash leaves either the old or the
/// new file on disk, never a torn one. A store without a path is purely in
/// memory (used for admission gating and tests).
#[derive(Debug, Clone)]
pub struct ContextStore {
    turns: Vec<Turn>,
    path: Option<PathBuf>,
}

impl ContextStore {
    /// Fresh store holding only the system turn. Nothing is written until
    /// the first mutation.
    pub fn new(path: impl Into<PathBuf>, system_prompt: &str) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
            path: Some(path.into()),
        }
    }

    pub fn in_memory(turns: Vec<Turn>) -> OllacordResult<Self> {
        check_system_first(&turns)?;
        Ok(Self { turns, path: None })
    }

    /// Load the last snapshot from `path` and note the downtime since it was
    /// written.
    pub fn restore(path: impl Into<PathBuf>, system_prompt: &str) -> OllacordResult<Self> {
        let path = path.into();
        let downtime = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| mtime.elapsed().ok());

        let mut turns = load_snapshot(&path);
        match turns.first_mut() {
            Some(first) if first.role == Role::System => system_prompt.clone_into(&mut first.content),
            _ => turns.insert(0, Turn::system(system_prompt)),
        }

        if turns.len() > 1
            && turns.last().is_some_and(|t| {
                t.role == Role::System && t.content.starts_with(DISCONNECTED_PREFIX)
            })
        {
            debug!("dropping stale disconnect notice");
            turns.pop();
        }

        let mut store = Self {
            turns,
            path: Some(path),
        };
        if let Some(elapsed) = downtime {
            let notice = format!("{} for {}", DISCONNECTED_PREFIX, format_elapsed(elapsed));
            info!("{}", notice);
            store.append(notice, Role::System, Vec::new(), None)?;
        }
        info!("context restored with {} turns", store.len());
        Ok(store)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Append a turn and persist the full sequence.
    ///
    /// A malformed `extra` field fails before anything changes. If the
    /// snapshot cannot be serialized the append is rolled back; if it
    /// cannot be written the turn stays in memory and the error is returned.
    pub fn append(
        &mut self,
        content: impl Into<String>,
        role: Role,
        images: Vec<String>,
        extra: Option<&str>,
    ) -> OllacordResult<()> {
        let mut turn = Turn::new(role, content);
        turn.images = images;
        if let Some(raw) = extra {
            let (key, value) = parse_extra_field(raw)?;
            turn.extra.insert(key, Value::String(value));
        }

        self.turns.push(turn);
        let json = match self.serialize() {
            Ok(json) => json,
            Err(e) => {
                self.turns.pop();
                return Err(e);
            }
        };
        self.write(&json)
    }

    /// Atomically replace every turn. The new sequence must start with a
    /// system turn.
    pub fn replace_all(&mut self, turns: Vec<Turn>) -> OllacordResult<()> {
        check_system_first(&turns)?;
        let previous = std::mem::replace(&mut self.turns, turns);
        let json = match self.serialize() {
            Ok(json) => json,
            Err(e) => {
                self.turns = previous;
                return Err(e);
            }
        };
        self.write(&json)
    }

    /// Overwrite the standing instruction at turn 0.
    pub fn set_system_prompt(&mut self, prompt: &str) -> OllacordResult<()> {
        match self.turns.first_mut() {
            Some(first) if first.role == Role::System => {
                if first.content == prompt {
                    return Ok(());
                }
                prompt.clone_into(&mut first.content);
            }
            _ => self.turns.insert(0, Turn::system(prompt)),
        }
        let json = self.serialize()?;
        self.write(&json)
    }

    /// Whether any turn carries extra field `key` whose value contains `needle`.
    pub fn has_extra_value(&self, key: &str, needle: &str) -> bool {
        self.turns.iter().any(|t| {
            t.extra
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|v| v.contains(needle))
        })
    }

    /// Pretty JSON of every turn after the system turn.
    pub fn history_json(&self) -> OllacordResult<String> {
        serde_json::to_string_pretty(self.turns.get(1..).unwrap_or_default())
            .map_err(|e| OllacordError::Format(format!("failed to serialize history: {}", e)))
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Turn::to_message).collect()
    }

    fn serialize(&self) -> OllacordResult<String> {
        serde_json::to_string_pretty(&self.turns)
            .map_err(|e| OllacordError::Format(format!("failed to serialize context: {}", e)))
    }

    fn write(&self, json: &str) -> OllacordResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        atomic_write(path, json).map_err(|e| {
            OllacordError::Persistence(format!(
                "failed to write context to {}: {:#}",
                path.display(),
                e
            ))
        })
    }
}

fn check_system_first(turns: &[Turn]) -> OllacordResult<()> {
    match turns.first() {
        Some(t) if t.role == Role::System => Ok(()),
        Some(t) => Err(OllacordError::Context(format!(
            "first turn must be a system turn, found {}",
            t.role
        ))),
        None => Err(OllacordError::Context(
            "context must contain at least the system turn".to_string(),
        )),
    }
}

fn load_snapshot(path: &Path) -> Vec<Turn> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("failed to read {}: {}, starting fresh", path.display(), e);
            return Vec::new();
        }
    };
    if content.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Turn>>(&content) {
        Ok(turns) => turns,
        Err(e) => {
            warn!(
                "context file {} is not a valid turn list ({}), starting fresh",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

/// Render a duration as `1 day, 2 hours, 1 minute, 5 seconds`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut secs = elapsed.as_secs();
    let units = [("day", 86_400), ("hour", 3_600), ("minute", 60), ("second", 1)];
    let mut parts = Vec::new();
    for (name, size) in units {
        let n = secs / size;
        secs %= size;
        if n > 0 {
            parts.push(format!("{} {}{}", n, name, if n == 1 { "" } else { "s" }));
        }
    }
    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}
