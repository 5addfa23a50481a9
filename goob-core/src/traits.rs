// ABOUTME: Seams between the core and the outside world.
// ABOUTME: Chat transport (inbound stream and outbound send), text completion, and live-status polling.

use crate::model::{Chat, InboundEvent, OutgoingMessage, User};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

// =============================================================================
// Chat transport
// =============================================================================

/// Boxed stream of inbound events
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A message the transport confirmed as delivered, in the same normalized
/// shape as inbound events so it can be persisted like one.
pub type SentMessage = InboundEvent;

/// Source of inbound events.
#[async_trait]
pub trait InboundTransport: Send + Sync {
    async fn event_stream(&self) -> Result<EventStream>;

    /// The bot's own account, used to recognise replies addressed to it
    async fn bot_user(&self) -> Result<User>;

    /// Transport identifier (e.g., "telegram")
    fn platform_id(&self) -> &'static str;
}

/// Delivers outgoing messages.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, chat: &Chat, message: &OutgoingMessage) -> Result<SentMessage>;
}

// =============================================================================
// Text completion
// =============================================================================

/// One prior line of conversation handed to the completion provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLine {
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub history: Vec<HistoryLine>,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

// =============================================================================
// Live status
// =============================================================================

/// A subject that is currently live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatus {
    /// Login / handle of the subject
    pub subject: String,
    pub display_name: String,
    /// Start of the current live session; a new value means a new session
    pub started_at: DateTime<Utc>,
    pub title: String,
    /// Id of the metadata entity (e.g. the game being played)
    pub metadata_id: Option<String>,
    /// Public page where the subject can be watched
    pub url: String,
}

/// Cached description of an external entity referenced by live statuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait LiveStatusProvider: Send + Sync {
    /// Obtain a fresh access credential. Returns how long it stays valid.
    async fn refresh_credential(&self) -> Result<Duration>;

    /// Which of `subjects` are live right now
    async fn list_active(&self, subjects: &[String]) -> Result<Vec<LiveStatus>>;

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>>;
}
