// ABOUTME: Replies when someone posts a link that was already shared in the same chat.
// ABOUTME: Claims every new link through LinkDedupe and names the original poster for repeats.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use goob_core::idempotency::{DupeLink, LinkCheck};
use goob_core::{Handler, HandlerContext, InboundEvent, OutgoingMessage};

/// RFC 1123 with the zone abbreviation, e.g. "Mon, 03 Jun 2024 21:00:00 CEST"
const POSTED_AT_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %Z";

pub struct DupeLinkHandler {
    tz: Tz,
}

impl DupeLinkHandler {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn format_posted_at(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format(POSTED_AT_FORMAT).to_string()
    }

    pub fn dupe_text(&self, original: &DupeLink) -> String {
        let poster = original
            .sender
            .as_ref()
            .map(|u| u.full_name())
            .unwrap_or_else(|| "someone".to_string());
        format!(
            "That was already posted on {} by {}",
            self.format_posted_at(original.posted_at),
            poster
        )
    }
}

#[async_trait]
impl Handler for DupeLinkHandler {
    fn key(&self) -> &str {
        "dupe_link"
    }

    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        if event.links().is_empty() {
            return Ok(());
        }

        let links = ctx.links.clone();
        let owned = event.clone();
        let outcomes = tokio::task::spawn_blocking(move || links.check_message(&owned))
            .await
            .context("Link check task failed")?
            .context("Failed to check links")?;

        for outcome in outcomes {
            let LinkCheck::Dupe(original) = outcome.check else {
                continue;
            };
            tracing::info!(
                chat_id = event.chat.id,
                message_id = event.message_id,
                url = %outcome.url,
                original_message_id = original.message_id,
                "Duplicate link"
            );
            ctx.outbound
                .reply(event, OutgoingMessage::plain(self.dupe_text(&original)))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use goob_core::User;

    fn dupe(sender: Option<User>) -> DupeLink {
        DupeLink {
            url: "example.com/a".to_string(),
            chat_id: -1,
            message_id: 5,
            sender,
            posted_at: Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_dupe_text_in_configured_zone() {
        let handler = DupeLinkHandler::new(chrono_tz::Europe::Berlin);
        let text = handler.dupe_text(&dupe(Some(User::new(1, "Ann").with_last_name("Lee"))));
        assert_eq!(
            text,
            "That was already posted on Mon, 03 Jun 2024 21:00:00 CEST by Ann Lee"
        );
    }

    #[test]
    fn test_dupe_text_without_known_sender() {
        let handler = DupeLinkHandler::new(chrono_tz::UTC);
        let text = handler.dupe_text(&dupe(None));
        assert_eq!(text, "That was already posted on Mon, 03 Jun 2024 19:00:00 UTC by someone");
    }
}
