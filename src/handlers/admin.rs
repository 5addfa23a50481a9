// ABOUTME: Owner-only admin commands, accepted in a private chat with the bot.
// ABOUTME: `/list` answers with every chat the store has seen.

use anyhow::{Context, Result};
use async_trait::async_trait;
use goob_core::model::{Chat, ChatKind};
use goob_core::{Handler, HandlerContext, InboundEvent, OutgoingMessage};

const LIST_COMMAND: &str = "/list";

/// Chat listing sorted by display name, ignoring case
pub fn chat_list_text(chats: &[Chat]) -> String {
    if chats.is_empty() {
        return "No chats found in database".to_string();
    }
    let mut named: Vec<_> = chats.iter().map(|chat| (chat.display_name(), chat)).collect();
    named.sort_by_key(|(name, _)| name.to_lowercase());

    let lines: Vec<String> = named
        .iter()
        .map(|(name, chat)| format!("Chat: {} (ID: {}, Type: {})", name, chat.id, chat.kind))
        .collect();
    format!("List of chats:\n\n{}", lines.join("\n"))
}

pub struct AdminHandler {
    owner: String,
}

impl AdminHandler {
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into() }
    }

    fn is_owner(&self, event: &InboundEvent) -> bool {
        event.chat.kind == ChatKind::Private
            && event
                .sender
                .as_ref()
                .and_then(|u| u.username.as_deref())
                .is_some_and(|name| name.eq_ignore_ascii_case(&self.owner))
    }
}

#[async_trait]
impl Handler for AdminHandler {
    fn key(&self) -> &str {
        "admin"
    }

    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        if event.text.as_deref().map(str::trim) != Some(LIST_COMMAND) || !self.is_owner(event) {
            return Ok(());
        }

        let store = ctx.store.clone();
        let text = match tokio::task::spawn_blocking(move || store.list_chats())
            .await
            .context("Chat listing task failed")?
        {
            Ok(chats) => chat_list_text(&chats),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list chats for admin");
                format!("Error querying chats: {}", e)
            }
        };

        ctx.outbound
            .send(&event.chat, OutgoingMessage::plain(text))
            .await
            .context("Failed to send chat list")?;
        Ok(())
    }
}
