// ABOUTME: Normalized chat data model shared by the transport, store, and handlers.
// ABOUTME: Users, chats, inbound events with UTF-16 annotated entities, media, and outgoing messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

// =============================================================================
// Users and Chats
// =============================================================================

/// A platform user. The id is assigned by the platform and never regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    pub fn new(id: UserId, first_name: impl Into<String>) -> Self {
        Self {
            id,
            username: None,
            first_name: first_name.into(),
            last_name: None,
            is_bot: false,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// "First Last", or just "First" when there is no last name
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    /// Username when present, otherwise the full name
    pub fn handle(&self) -> String {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.full_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatKind::Private => write!(f, "private"),
            ChatKind::Group => write!(f, "group"),
            ChatKind::Supergroup => write!(f, "supergroup"),
            ChatKind::Channel => write!(f, "channel"),
        }
    }
}

impl FromStr for ChatKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(ChatKind::Private),
            "group" => Ok(ChatKind::Group),
            "supergroup" => Ok(ChatKind::Supergroup),
            "channel" => Ok(ChatKind::Channel),
            _ => anyhow::bail!("Unknown chat kind: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Chat {
    pub fn group(id: ChatId, title: impl Into<String>) -> Self {
        Self {
            id,
            kind: ChatKind::Group,
            title: Some(title.into()),
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn private(user: &User) -> Self {
        Self {
            id: user.id,
            kind: ChatKind::Private,
            title: None,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()),
            last_name: user.last_name.clone(),
        }
    }

    /// Best human-readable name: title, then username, then first/last name
    pub fn display_name(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return username.to_string();
        }
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        parts.join(" ")
    }
}

// =============================================================================
// Message content
// =============================================================================

/// A text annotation. `offset` and `length` count UTF-16 code units, the same
/// convention the transport uses for its entity ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAnnotation {
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    pub url: Option<String>,
    pub user: Option<User>,
    pub language: Option<String>,
}

impl EntityAnnotation {
    pub fn new(kind: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            kind: kind.into(),
            offset,
            length,
            url: None,
            user: None,
            language: None,
        }
    }

    pub fn url(offset: usize, length: usize) -> Self {
        Self::new("url", offset, length)
    }

    pub fn text_link(offset: usize, length: usize, target: impl Into<String>) -> Self {
        Self {
            url: Some(target.into()),
            ..Self::new("text_link", offset, length)
        }
    }
}

/// Slice `text` by a UTF-16 code unit range.
///
/// Returns None when the range is out of bounds or splits a surrogate pair.
pub fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    if end > units.len() {
        return None;
    }
    String::from_utf16(&units[offset..end]).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Audio,
    Document,
    Voice,
    VideoNote,
    Sticker,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Animation => "animation",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
            MediaKind::Sticker => "sticker",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "video" => Ok(MediaKind::Video),
            "animation" => Ok(MediaKind::Animation),
            "audio" => Ok(MediaKind::Audio),
            "document" => Ok(MediaKind::Document),
            "voice" => Ok(MediaKind::Voice),
            "video_note" => Ok(MediaKind::VideoNote),
            "sticker" => Ok(MediaKind::Sticker),
            _ => anyhow::bail!("Unknown media kind: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub file_id: String,
    pub file_unique_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<u32>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
    pub thumb_file_id: Option<String>,
}

impl Media {
    pub fn new(kind: MediaKind, file_id: impl Into<String>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
            file_unique_id: None,
            width: None,
            height: None,
            duration: None,
            file_name: None,
            mime_type: None,
            file_size: None,
            thumb_file_id: None,
        }
    }
}

/// The message this one replies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: MessageId,
    pub sender: Option<User>,
}

/// Where a forwarded message originally came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardOrigin {
    pub user: Option<User>,
    pub chat: Option<Chat>,
    pub date: DateTime<Utc>,
}

// =============================================================================
// Inbound event
// =============================================================================

/// A message as delivered by the transport, already in normalized shape.
///
/// Messages the bot itself sent are represented the same way so that
/// conversation history stays complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message_id: MessageId,
    pub chat: Chat,
    pub sender: Option<User>,
    pub date: DateTime<Utc>,
    pub edit_date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityAnnotation>,
    #[serde(default)]
    pub caption_entities: Vec<EntityAnnotation>,
    #[serde(default)]
    pub media: Vec<Media>,
    pub reply_to: Option<ReplyRef>,
    pub forward: Option<ForwardOrigin>,
    pub media_group_id: Option<String>,
    pub author_signature: Option<String>,
    /// Full transport representation, stored verbatim in snapshot columns
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

impl InboundEvent {
    /// Minimal text message, mostly useful for tests and synthetic events
    pub fn text(message_id: MessageId, chat: Chat, sender: User, text: impl Into<String>) -> Self {
        Self {
            message_id,
            chat,
            sender: Some(sender),
            date: Utc::now(),
            edit_date: None,
            text: Some(text.into()),
            caption: None,
            entities: Vec::new(),
            caption_entities: Vec::new(),
            media: Vec::new(),
            reply_to: None,
            forward: None,
            media_group_id: None,
            author_signature: None,
            raw: None,
        }
    }

    pub fn is_edit(&self) -> bool {
        self.edit_date.is_some()
    }

    /// Body text, falling back to the caption
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// True when this message replies to a message sent by `user_id`
    pub fn is_reply_to(&self, user_id: UserId) -> bool {
        self.reply_to
            .as_ref()
            .and_then(|r| r.sender.as_ref())
            .is_some_and(|s| s.id == user_id)
    }

    /// Text covered by an annotation. Caption annotations slice the caption.
    pub fn annotated_text(&self, entity: &EntityAnnotation, in_caption: bool) -> Option<String> {
        let source = if in_caption {
            self.caption.as_deref()?
        } else {
            self.text.as_deref()?
        };
        utf16_slice(source, entity.offset, entity.length)
    }

    /// Every link in the message, in order of appearance: `url` annotations
    /// (sliced from the text) and `text_link` targets, body first then caption.
    pub fn links(&self) -> Vec<String> {
        let mut links = Vec::new();
        let sources = [(&self.entities, false), (&self.caption_entities, true)];
        for (entities, in_caption) in sources {
            for entity in entities {
                match entity.kind.as_str() {
                    "url" => {
                        if let Some(text) = self.annotated_text(entity, in_caption) {
                            links.push(text);
                        }
                    }
                    "text_link" => {
                        if let Some(url) = entity.url.clone() {
                            links.push(url);
                        }
                    }
                    _ => {}
                }
            }
        }
        links
    }
}

// =============================================================================
// Outgoing messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    Markdown,
    MarkdownV2,
    Html,
}

/// A message the bot sends, optionally as a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub reply_to: Option<MessageId>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            reply_to: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Markdown),
            ..Self::plain(text)
        }
    }

    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }
}
