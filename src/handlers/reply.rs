// ABOUTME: Contextual replies from a completion provider.
// ABOUTME: Triggers on replies to the bot or messages addressed to it by name, with optional chat history.

use anyhow::{Context, Result};
use async_trait::async_trait;
use goob_core::config::ReplyConfig;
use goob_core::metrics;
use goob_core::store::HistoryEntry;
use goob_core::{
    CompletionProvider, CompletionRequest, Handler, HandlerContext, HistoryLine, InboundEvent,
    OutgoingMessage,
};
use regex::Regex;
use std::sync::Arc;

const MESSAGE_PLACEHOLDER: &str = "{message}";

pub struct ReplyHandler {
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    user_prompt: String,
    /// History depth, or None when history is disabled
    history_depth: Option<usize>,
    address: Regex,
}

impl ReplyHandler {
    pub fn new(settings: &ReplyConfig, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let address = Regex::new(&settings.address_pattern)
            .with_context(|| format!("Invalid reply.address_pattern '{}'", settings.address_pattern))?;
        Ok(Self {
            provider,
            system_prompt: settings.system_prompt.clone(),
            user_prompt: settings.user_prompt.clone(),
            history_depth: settings.use_history.then_some(settings.history_depth),
            address,
        })
    }

    /// Replies to one of the bot's messages, or text or a caption matching the address pattern
    pub fn is_triggered(&self, ctx: &HandlerContext, event: &InboundEvent) -> bool {
        if ctx.bot.as_ref().is_some_and(|bot| event.is_reply_to(bot.id)) {
            return true;
        }
        event
            .text_or_caption()
            .is_some_and(|text| self.address.is_match(text))
    }

    pub fn build_request(&self, message: &str, history: &[HistoryEntry]) -> CompletionRequest {
        let history = history
            .iter()
            .filter_map(|entry| {
                let text = entry.text.as_deref()?;
                let author = entry
                    .sender
                    .as_ref()
                    .map(|u| u.handle())
                    .unwrap_or_else(|| "unknown".to_string());
                Some(HistoryLine {
                    author,
                    text: text.to_string(),
                })
            })
            .collect();

        CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: self.user_prompt.replace(MESSAGE_PLACEHOLDER, message),
            history,
        }
    }

    /// Recent history before `event`, oldest first
    async fn history(&self, ctx: &HandlerContext, event: &InboundEvent) -> Vec<HistoryEntry> {
        let Some(depth) = self.history_depth.filter(|d| *d > 0) else {
            return Vec::new();
        };

        let store = ctx.store.clone();
        let chat_id = event.chat.id;
        // One extra row in case the triggering message is already persisted
        let result = tokio::task::spawn_blocking(move || store.recent_history(chat_id, depth + 1)).await;
        let mut entries = match result {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                tracing::warn!(chat_id, error = %e, "Failed to load chat history");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "History task failed");
                return Vec::new();
            }
        };
        entries.retain(|entry| entry.message_id != event.message_id);
        let excess = entries.len().saturating_sub(depth);
        entries.drain(..excess);
        entries
    }
}

#[async_trait]
impl Handler for ReplyHandler {
    fn key(&self) -> &str {
        "reply"
    }

    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let Some(message) = event.text_or_caption() else {
            return Ok(());
        };
        if !self.is_triggered(ctx, event) {
            return Ok(());
        }

        let history = self.history(ctx, event).await;
        let request = self.build_request(message, &history);
        tracing::debug!(
            chat_id = event.chat.id,
            message_id = event.message_id,
            history = request.history.len(),
            "Requesting completion"
        );

        let reply = match self.provider.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                metrics::record_error("completion");
                tracing::warn!(chat_id = event.chat.id, error = %e, "Completion failed, not replying");
                return Ok(());
            }
        };

        let reply = reply.trim();
        if reply.is_empty() {
            return Ok(());
        }
        ctx.outbound
            .reply(event, OutgoingMessage::plain(reply))
            .await?;
        Ok(())
    }
}
