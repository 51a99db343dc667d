use crate::bus::{MessageBus, OutboundEvent, OutboundMessage};
use crate::channels::base::BaseChannel;
use crate::channels::discord::DiscordChannel;
use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const SEND_ATTEMPTS: u32 = 3;

/// Owns the platform channels and routes outbound events to them.
pub struct ChannelManager {
    channels: Vec<Box<dyn BaseChannel>>,
    retry_delay: Duration,
}

impl ChannelManager {
    pub fn new(config: &Config, bus: Arc<MessageBus>) -> Self {
        let mut channels: Vec<Box<dyn BaseChannel>> = Vec::new();

        if config.discord.enabled && !config.discord.token.is_empty() {
            tracing::debug!("Initializing Discord channel...");
            channels.push(Box::new(DiscordChannel::new(
                config.discord.clone(),
                bus,
                config.attachment_path(),
            )));
            tracing::info!("Discord channel enabled");
        } else {
            tracing::warn!("Discord channel disabled or missing token");
        }

        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Box<dyn BaseChannel>>) -> Self {
        Self {
            channels,
            retry_delay: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn enabled_channels(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub async fn start_all(&mut self) -> Result<()> {
        for channel in &mut self.channels {
            let name = channel.name().to_string();
            tracing::info!("Starting channel: {}", name);
            channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to start channel {}: {}", name, e))?;
        }
        Ok(())
    }

    pub async fn stop_all(&mut self) -> Result<()> {
        for channel in &mut self.channels {
            channel.stop().await?;
        }
        Ok(())
    }

    /// Deliver one outbound event. Typing indicators are best effort;
    /// messages are retried a few times before being dropped.
    pub async fn dispatch(&self, event: &OutboundEvent) {
        let Some(channel) = self.channels.iter().find(|c| c.name() == event.channel()) else {
            tracing::error!(
                "No channel found for: {} (available channels: {:?})",
                event.channel(),
                self.enabled_channels()
            );
            return;
        };

        match event {
            OutboundEvent::Typing { chat_id, .. } => {
                if let Err(e) = channel.send_typing(chat_id).await {
                    tracing::debug!("typing indicator failed on {}: {}", channel.name(), e);
                }
            }
            OutboundEvent::Message(msg) => self.send_with_retry(channel.as_ref(), msg).await,
        }
    }

    async fn send_with_retry(&self, channel: &dyn BaseChannel, msg: &OutboundMessage) {
        for attempt in 1..=SEND_ATTEMPTS {
            match channel.send(msg).await {
                Ok(()) => {
                    tracing::debug!("sent {} chars to {}", msg.content.len(), msg.channel);
                    return;
                }
                Err(e) if attempt < SEND_ATTEMPTS => {
                    tracing::warn!(
                        "Send to {} failed (attempt {}/{}): {}, retrying...",
                        msg.channel,
                        attempt,
                        SEND_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Error sending message to {} channel after {} attempts: {}",
                        msg.channel,
                        SEND_ATTEMPTS,
                        e
                    );
                }
            }
        }
    }

    /// Drain outbound events until the bus closes.
    pub async fn run_outbound(&self, mut rx: mpsc::Receiver<OutboundEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch(&event).await;
        }
        tracing::info!("outbound queue closed");
    }
}
