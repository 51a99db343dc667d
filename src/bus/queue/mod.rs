use crate::bus::{InboundEvent, OutboundEvent};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_RATE_LIMIT: usize = 30;
const DEFAULT_RATE_WINDOW_S: f64 = 60.0;
const DEFAULT_CAPACITY: usize = 256;
/// Timeout for channel send operations so a stalled agent task cannot
/// block the gateway event handler forever.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum number of tracked senders before forced pruning
const MAX_TRACKED_SENDERS: usize = 5000;

/// Queues between the platform channels and the single agent task.
///
/// Inbound events are consumed by one receiver, which is what serializes
/// handling of the conversation.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    outbound_tx: mpsc::Sender<OutboundEvent>,
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundEvent>>>,
    rate_limit: usize,
    rate_window: Duration,
    sender_timestamps: Mutex<HashMap<String, Vec<Instant>>>,
}

impl MessageBus {
    pub fn new(rate_limit: usize, rate_window_secs: f64, capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            rate_limit,
            rate_window: Duration::from_secs_f64(rate_window_secs),
            sender_timestamps: Mutex::new(HashMap::new()),
        }
    }

    /// Extract the inbound receiver. Only the first call gets it.
    pub fn take_inbound_rx(&self) -> Option<mpsc::Receiver<InboundEvent>> {
        self.inbound_rx.lock().ok()?.take()
    }

    /// Extract the outbound receiver. Only the first call gets it.
    pub fn take_outbound_rx(&self) -> Option<mpsc::Receiver<OutboundEvent>> {
        self.outbound_rx.lock().ok()?.take()
    }

    pub async fn publish_inbound(&self, event: InboundEvent) -> Result<()> {
        let key = format!("{}:{}", event.channel(), event.sender());
        self.check_rate(&key)?;

        tokio::time::timeout(SEND_TIMEOUT, self.inbound_tx.send(event))
            .await
            .map_err(|_| {
                warn!(
                    "inbound send timed out after {}s, agent task stalled",
                    SEND_TIMEOUT.as_secs()
                );
                anyhow::anyhow!("inbound send timed out, queue full")
            })?
            .context("failed to send inbound event, receiver closed")?;
        debug!("inbound event queued from {}", key);
        Ok(())
    }

    pub async fn publish_outbound(&self, event: OutboundEvent) -> Result<()> {
        tokio::time::timeout(SEND_TIMEOUT, self.outbound_tx.send(event))
            .await
            .map_err(|_| anyhow::anyhow!("outbound send timed out, queue full"))?
            .context("failed to send outbound event, receiver closed")?;
        Ok(())
    }

    fn check_rate(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut senders = self
            .sender_timestamps
            .lock()
            .map_err(|_| anyhow::anyhow!("rate limiter lock poisoned"))?;

        let timestamps = senders.entry(key.to_string()).or_default();
        let cutoff = now.checked_sub(self.rate_window).unwrap_or(now);
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= self.rate_limit {
            warn!(
                "Rate limit hit for {} ({}/{:.0}s), dropping event",
                key,
                self.rate_limit,
                self.rate_window.as_secs_f64()
            );
            return Err(anyhow::anyhow!("Rate limit exceeded for {}", key));
        }
        timestamps.push(now);

        if senders.len() > MAX_TRACKED_SENDERS {
            let rate_window = self.rate_window;
            senders.retain(|_, ts| ts.iter().any(|&t| now.duration_since(t) < rate_window));
        }
        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW_S, DEFAULT_CAPACITY)
    }
}
