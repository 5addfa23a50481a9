// ABOUTME: Outbound send path that records what the bot itself says.
// ABOUTME: Every delivered message is persisted like an inbound one so history stays complete.

use crate::metrics;
use crate::model::{Chat, InboundEvent, OutgoingMessage};
use crate::store::Store;
use crate::traits::{OutboundSender, SentMessage};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Delivery counts for a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SendAdapter {
    transport: Arc<dyn OutboundSender>,
    store: Store,
}

impl SendAdapter {
    pub fn new(transport: Arc<dyn OutboundSender>, store: Store) -> Self {
        Self { transport, store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Deliver `message` to `chat`, then persist the confirmed message.
    ///
    /// A persistence failure after delivery is logged and does not fail the send.
    pub async fn send(&self, chat: &Chat, message: OutgoingMessage) -> Result<SentMessage> {
        let sent = match self.transport.send(chat, &message).await {
            Ok(sent) => sent,
            Err(e) => {
                metrics::record_send_failure();
                return Err(e).with_context(|| format!("Failed to send message to chat {}", chat.id));
            }
        };
        metrics::record_message_sent();

        let store = self.store.clone();
        let record = sent.clone();
        match tokio::task::spawn_blocking(move || store.record_event(&record)).await {
            Ok(Ok(_)) => {
                tracing::debug!(chat_id = chat.id, message_id = sent.message_id, "Sent message recorded");
            }
            Ok(Err(e)) => {
                metrics::record_store_error("outgoing");
                tracing::warn!(
                    chat_id = chat.id,
                    message_id = sent.message_id,
                    error = %e,
                    "Sent message delivered but not recorded"
                );
            }
            Err(e) => {
                tracing::error!(chat_id = chat.id, error = %e, "Recording task failed");
            }
        }

        Ok(sent)
    }

    /// Reply to `event` in its own chat
    pub async fn reply(&self, event: &InboundEvent, message: OutgoingMessage) -> Result<SentMessage> {
        self.send(&event.chat, message.replying_to(event.message_id)).await
    }

    /// Send `message` to every chat the store knows about.
    pub async fn broadcast(&self, message: &OutgoingMessage) -> Result<BroadcastReport> {
        let store = self.store.clone();
        let chats = tokio::task::spawn_blocking(move || store.list_chats())
            .await
            .context("Chat listing task failed")?
            .context("Failed to list chats")?;

        let mut report = BroadcastReport::default();
        for chat in chats {
            match self.send(&chat, message.clone()).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(chat_id = chat.id, error = %e, "Broadcast delivery failed");
                }
            }
        }
        Ok(report)
    }
}
