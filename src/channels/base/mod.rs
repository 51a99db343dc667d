use crate::bus::OutboundMessage;
use async_trait::async_trait;

#[async_trait]
pub trait BaseChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&mut self) -> anyhow::Result<()>;
    async fn stop(&mut self) -> anyhow::Result<()>;
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;

    /// Send a typing indicator to signal the bot is processing.
    /// Default is a no-op for channels that don't support typing indicators.
    async fn send_typing(&self, _chat_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Split a message into chunks of at most `limit` characters.
///
/// Cuts at the last newline before the limit, or hard-cuts at a character
/// boundary when there is none. Newlines around the cut are dropped.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > limit {
        let hard = remaining
            .char_indices()
            .nth(limit)
            .map_or(remaining.len(), |(i, _)| i);
        let (chunk, rest) = match remaining[..hard].rfind('\n') {
            Some(idx) if idx > 0 => remaining.split_at(idx),
            _ => remaining.split_at(hard),
        };
        let chunk = chunk.trim_end_matches('\n');
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = rest.trim_start_matches('\n');
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}
