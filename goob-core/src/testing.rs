// ABOUTME: In-memory fakes for the collaborator traits plus event builders.
// ABOUTME: Lets handler, dispatcher, and poller tests run without a network or a transport.

use crate::model::{
    Chat, ChatId, EntityAnnotation, InboundEvent, MessageId, OutgoingMessage, ReplyRef, User,
};
use crate::store::{Store, StoreOptions};
use crate::traits::{
    CompletionProvider, CompletionRequest, LiveStatus, LiveStatusProvider, Metadata,
    OutboundSender, SentMessage,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fresh in-memory store with default options
pub fn memory_store() -> Store {
    Store::open_in_memory(StoreOptions::default())
        .unwrap_or_else(|e| panic!("in-memory store failed to open: {e}"))
}

pub fn bot_user() -> User {
    let mut bot = User::new(1_000, "Goob").with_username("goob_bot");
    bot.is_bot = true;
    bot
}

// =============================================================================
// Event builder
// =============================================================================

/// Builds text events with correctly computed UTF-16 link annotations
pub struct EventBuilder {
    event: InboundEvent,
}

impl EventBuilder {
    pub fn new(message_id: MessageId, chat: Chat, sender: User) -> Self {
        Self {
            event: InboundEvent::text(message_id, chat, sender, ""),
        }
    }

    fn text_mut(&mut self) -> &mut String {
        self.event.text.get_or_insert_with(String::new)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text_mut().push_str(text);
        self
    }

    /// Append `url` to the text and annotate it as a `url` entity
    pub fn link(mut self, url: &str) -> Self {
        let offset = self.text_mut().encode_utf16().count();
        self.text_mut().push_str(url);
        self.event
            .entities
            .push(EntityAnnotation::url(offset, url.encode_utf16().count()));
        self
    }

    pub fn replying_to(mut self, message_id: MessageId, sender: Option<User>) -> Self {
        self.event.reply_to = Some(ReplyRef { message_id, sender });
        self
    }

    pub fn edited(mut self) -> Self {
        self.event.edit_date = Some(Utc::now());
        self
    }

    pub fn build(self) -> InboundEvent {
        self.event
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Records every send and answers with a synthetic confirmed message
pub struct RecordingSender {
    bot: User,
    next_id: AtomicI64,
    sent: Mutex<Vec<(Chat, OutgoingMessage)>>,
    failing_chats: Mutex<HashSet<ChatId>>,
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            bot: bot_user(),
            next_id: AtomicI64::new(10_000),
            sent: Mutex::new(Vec::new()),
            failing_chats: Mutex::new(HashSet::new()),
        }
    }

    /// Make every send to `chat_id` fail
    pub fn fail_chat(&self, chat_id: ChatId) {
        if let Ok(mut failing) = self.failing_chats.lock() {
            failing.insert(chat_id);
        }
    }

    pub fn sent(&self) -> Vec<(Chat, OutgoingMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, m)| m.text).collect()
    }
}

#[async_trait]
impl OutboundSender for RecordingSender {
    async fn send(&self, chat: &Chat, message: &OutgoingMessage) -> Result<SentMessage> {
        let failing = self
            .failing_chats
            .lock()
            .map_err(|e| anyhow!("Sender mutex poisoned: {}", e))?
            .contains(&chat.id);
        if failing {
            return Err(anyhow!("chat {} is unreachable", chat.id));
        }

        self.sent
            .lock()
            .map_err(|e| anyhow!("Sender mutex poisoned: {}", e))?
            .push((chat.clone(), message.clone()));

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut confirmed = InboundEvent::text(id, chat.clone(), self.bot.clone(), message.text.clone());
        confirmed.reply_to = message.reply_to.map(|message_id| ReplyRef {
            message_id,
            sender: None,
        });
        Ok(confirmed)
    }
}

// =============================================================================
// Completion
// =============================================================================

/// Returns queued replies in order, then the fallback reply
pub struct FakeCompletion {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub fn replying(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_fail(self, message: &str) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(message.to_string()));
        }
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .map_err(|e| anyhow!("Completion mutex poisoned: {}", e))?
            .push(request.clone());
        let next = self
            .replies
            .lock()
            .map_err(|e| anyhow!("Completion mutex poisoned: {}", e))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

// =============================================================================
// Live status
// =============================================================================

pub struct FakeLiveStatus {
    live: Mutex<Vec<LiveStatus>>,
    metadata: Mutex<HashMap<String, Metadata>>,
    fail_listing: Mutex<bool>,
    credential_lifetime: Duration,
    refreshes: AtomicUsize,
    metadata_lookups: AtomicUsize,
}

impl FakeLiveStatus {
    pub fn new(credential_lifetime: Duration) -> Self {
        Self {
            live: Mutex::new(Vec::new()),
            metadata: Mutex::new(HashMap::new()),
            fail_listing: Mutex::new(false),
            credential_lifetime,
            refreshes: AtomicUsize::new(0),
            metadata_lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_live(&self, statuses: Vec<LiveStatus>) {
        if let Ok(mut live) = self.live.lock() {
            *live = statuses;
        }
    }

    pub fn add_metadata(&self, id: &str, name: &str) {
        if let Ok(mut metadata) = self.metadata.lock() {
            metadata.insert(
                id.to_string(),
                Metadata {
                    id: id.to_string(),
                    name: name.to_string(),
                },
            );
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_listing.lock() {
            *flag = fail;
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn metadata_lookups(&self) -> usize {
        self.metadata_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveStatusProvider for FakeLiveStatus {
    async fn refresh_credential(&self) -> Result<Duration> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.credential_lifetime)
    }

    async fn list_active(&self, subjects: &[String]) -> Result<Vec<LiveStatus>> {
        if *self
            .fail_listing
            .lock()
            .map_err(|e| anyhow!("Live mutex poisoned: {}", e))?
        {
            return Err(anyhow!("status service unavailable"));
        }
        let live = self
            .live
            .lock()
            .map_err(|e| anyhow!("Live mutex poisoned: {}", e))?;
        Ok(live
            .iter()
            .filter(|s| subjects.contains(&s.subject))
            .cloned()
            .collect())
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        self.metadata_lookups.fetch_add(1, Ordering::SeqCst);
        let metadata = self
            .metadata
            .lock()
            .map_err(|e| anyhow!("Live mutex poisoned: {}", e))?;
        Ok(metadata.get(id).cloned())
    }
}

/// A live status for `subject` with a twitch-style page url
pub fn live_status(subject: &str, started_at: chrono::DateTime<Utc>, metadata_id: Option<&str>) -> LiveStatus {
    LiveStatus {
        subject: subject.to_string(),
        display_name: subject.to_string(),
        started_at,
        title: format!("{} stream", subject),
        metadata_id: metadata_id.map(str::to_string),
        url: format!("https://www.twitch.tv/{}", subject),
    }
}
