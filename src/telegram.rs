// ABOUTME: Telegram transport: long-polls the Bot API and sends messages via teloxide.
// ABOUTME: Converts messages and edited messages into InboundEvents, and sent messages back into the same shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use goob_core::config::TelegramConfig;
use goob_core::model::{
    Chat, ChatKind, EntityAnnotation, ForwardOrigin, InboundEvent, Media, MediaKind, OutgoingMessage,
    ParseMode, ReplyRef, User,
};
use goob_core::{EventStream, InboundTransport, OutboundSender, SentMessage};
use teloxide::prelude::*;
use teloxide::types::{
    FileMeta, Message as TgMessage, MessageEntity, MessageEntityKind, MessageId,
    ReplyParameters, UpdateKind,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// =============================================================================
// Conversion
// =============================================================================

pub fn convert_user(user: &teloxide::types::User) -> User {
    User {
        id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        is_bot: user.is_bot,
    }
}

pub fn convert_chat(chat: &teloxide::types::Chat) -> Chat {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Group
    };
    Chat {
        id: chat.id.0,
        kind,
        title: chat.title().map(str::to_string),
        username: chat.username().map(str::to_string),
        first_name: chat.first_name().map(str::to_string),
        last_name: chat.last_name().map(str::to_string),
    }
}

fn convert_entity(entity: &MessageEntity) -> EntityAnnotation {
    // Bot API type name, e.g. "text_link"
    let kind = serde_json::to_value(entity)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let mut annotation = EntityAnnotation::new(kind, entity.offset, entity.length);
    match &entity.kind {
        MessageEntityKind::TextLink { url } => annotation.url = Some(url.to_string()),
        MessageEntityKind::TextMention { user } => annotation.user = Some(convert_user(user)),
        MessageEntityKind::Pre { language } => annotation.language = language.clone(),
        _ => {}
    }
    annotation
}

fn file_media(kind: MediaKind, file: &FileMeta) -> Media {
    let mut media = Media::new(kind, file.id.to_string());
    media.file_unique_id = Some(file.unique_id.to_string());
    media.file_size = Some(file.size as u64);
    media
}

fn convert_media(message: &TgMessage) -> Vec<Media> {
    let mut items = Vec::new();

    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        let mut media = file_media(MediaKind::Photo, &photo.file);
        media.width = Some(photo.width);
        media.height = Some(photo.height);
        items.push(media);
    }
    if let Some(video) = message.video() {
        let mut media = file_media(MediaKind::Video, &video.file);
        media.width = Some(video.width);
        media.height = Some(video.height);
        media.duration = Some(video.duration.seconds());
        media.file_name = video.file_name.clone();
        media.mime_type = video.mime_type.as_ref().map(|m| m.to_string());
        media.thumb_file_id = video.thumbnail.as_ref().map(|t| t.file.id.to_string());
        items.push(media);
    }
    if let Some(animation) = message.animation() {
        let mut media = file_media(MediaKind::Animation, &animation.file);
        media.width = Some(animation.width);
        media.height = Some(animation.height);
        media.duration = Some(animation.duration.seconds());
        media.file_name = animation.file_name.clone();
        media.mime_type = animation.mime_type.as_ref().map(|m| m.to_string());
        items.push(media);
    }
    if let Some(audio) = message.audio() {
        let mut media = file_media(MediaKind::Audio, &audio.file);
        media.duration = Some(audio.duration.seconds());
        media.file_name = audio.file_name.clone();
        media.mime_type = audio.mime_type.as_ref().map(|m| m.to_string());
        items.push(media);
    }
    if let Some(document) = message.document() {
        let mut media = file_media(MediaKind::Document, &document.file);
        media.file_name = document.file_name.clone();
        media.mime_type = document.mime_type.as_ref().map(|m| m.to_string());
        media.thumb_file_id = document.thumbnail.as_ref().map(|t| t.file.id.to_string());
        items.push(media);
    }
    if let Some(voice) = message.voice() {
        let mut media = file_media(MediaKind::Voice, &voice.file);
        media.duration = Some(voice.duration.seconds());
        media.mime_type = voice.mime_type.as_ref().map(|m| m.to_string());
        items.push(media);
    }
    if let Some(note) = message.video_note() {
        let mut media = file_media(MediaKind::VideoNote, &note.file);
        media.width = Some(note.length);
        media.height = Some(note.length);
        media.duration = Some(note.duration.seconds());
        items.push(media);
    }
    if let Some(sticker) = message.sticker() {
        let mut media = file_media(MediaKind::Sticker, &sticker.file);
        media.width = Some(u32::from(sticker.width));
        media.height = Some(u32::from(sticker.height));
        items.push(media);
    }

    items
}

pub fn convert_message(message: &TgMessage) -> InboundEvent {
    let raw = serde_json::to_value(message).ok();
    let raw_str = |key: &str| {
        raw.as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let forward = message.forward_date().map(|date| ForwardOrigin {
        user: message.forward_from_user().map(convert_user),
        chat: message.forward_from_chat().map(convert_chat),
        date,
    });

    InboundEvent {
        message_id: i64::from(message.id.0),
        chat: convert_chat(&message.chat),
        sender: message.from.as_ref().map(convert_user),
        date: message.date,
        edit_date: message.edit_date().copied(),
        text: message.text().map(str::to_string),
        caption: message.caption().map(str::to_string),
        entities: message
            .entities()
            .map(|e| e.iter().map(convert_entity).collect())
            .unwrap_or_default(),
        caption_entities: message
            .caption_entities()
            .map(|e| e.iter().map(convert_entity).collect())
            .unwrap_or_default(),
        media: convert_media(message),
        reply_to: message.reply_to_message().map(|r| ReplyRef {
            message_id: i64::from(r.id.0),
            sender: r.from.as_ref().map(convert_user),
        }),
        forward,
        media_group_id: raw_str("media_group_id"),
        author_signature: raw_str("author_signature"),
        raw,
    }
}

#[allow(deprecated)]
fn telegram_parse_mode(mode: ParseMode) -> teloxide::types::ParseMode {
    match mode {
        ParseMode::Markdown => teloxide::types::ParseMode::Markdown,
        ParseMode::MarkdownV2 => teloxide::types::ParseMode::MarkdownV2,
        ParseMode::Html => teloxide::types::ParseMode::Html,
    }
}

// =============================================================================
// TelegramTransport
// =============================================================================

/// Telegram transport using teloxide with long polling
pub struct TelegramTransport {
    bot: Bot,
    me: User,
    poll_timeout_secs: u32,
}

impl TelegramTransport {
    /// Create a transport from config.
    ///
    /// Resolves the bot's own account via the `getMe` API call.
    pub async fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("telegram.bot_token is required (or set GOOB_TELEGRAM_TOKEN)")?;
        let bot = Bot::new(token);

        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let me = convert_user(&me.user);

        tracing::info!(
            bot_username = ?me.username,
            bot_id = me.id,
            "Telegram bot authenticated"
        );

        Ok(Self {
            bot,
            me,
            poll_timeout_secs: u32::try_from(config.poll_timeout_secs).unwrap_or(u32::MAX),
        })
    }
}

#[async_trait]
impl InboundTransport for TelegramTransport {
    async fn event_stream(&self) -> Result<EventStream> {
        let (tx, rx) = mpsc::channel(256);
        let bot = self.bot.clone();
        let bot_id = self.me.id;
        let timeout = self.poll_timeout_secs;

        tokio::spawn(async move {
            let mut offset: i32 = 0;

            loop {
                let updates = match bot.get_updates().offset(offset).timeout(timeout).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!(
                            platform = "telegram",
                            error = %e,
                            "Long polling error, retrying in 5s"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in &updates {
                    offset = update.id.as_offset();

                    let message = match &update.kind {
                        UpdateKind::Message(msg) | UpdateKind::EditedMessage(msg) => msg,
                        _ => continue,
                    };

                    if message.from.as_ref().is_some_and(|f| f.id.0 as i64 == bot_id) {
                        continue;
                    }

                    if tx.send(convert_message(message)).await.is_err() {
                        tracing::warn!(platform = "telegram", "Event stream receiver dropped");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn bot_user(&self) -> Result<User> {
        Ok(self.me.clone())
    }

    fn platform_id(&self) -> &'static str {
        "telegram"
    }
}

#[async_trait]
impl OutboundSender for TelegramTransport {
    async fn send(&self, chat: &Chat, message: &OutgoingMessage) -> Result<SentMessage> {
        let mut req = self.bot.send_message(ChatId(chat.id), &message.text);
        if let Some(mode) = message.parse_mode {
            req = req.parse_mode(telegram_parse_mode(mode));
        }
        if let Some(reply_to) = message.reply_to {
            let id = i32::try_from(reply_to).context("Reply target id out of range")?;
            req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
        }

        let sent = req.await.context("Failed to send Telegram message")?;
        Ok(convert_message(&sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(json: &str) -> TgMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_telegram_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TelegramTransport>();
    }

    #[test]
    fn test_convert_text_message_with_url() {
        let message = sample(
            r#"{
                "message_id": 5,
                "date": 1717441200,
                "chat": {"id": -100, "type": "supergroup", "title": "Room"},
                "from": {"id": 7, "is_bot": false, "first_name": "Ann", "username": "ann"},
                "text": "see https://a.io",
                "entities": [{"type": "url", "offset": 4, "length": 12}]
            }"#,
        );

        let event = convert_message(&message);
        assert_eq!(event.message_id, 5);
        assert_eq!(event.chat.id, -100);
        assert_eq!(event.chat.kind, ChatKind::Supergroup);
        assert_eq!(event.chat.title.as_deref(), Some("Room"));
        assert_eq!(event.sender.as_ref().unwrap().username.as_deref(), Some("ann"));
        assert_eq!(event.entities[0].kind, "url");
        assert_eq!(event.links(), vec!["https://a.io"]);
        assert!(!event.is_edit());
        assert!(event.raw.is_some());
    }

    #[test]
    fn test_convert_reply_and_text_link() {
        let message = sample(
            r#"{
                "message_id": 6,
                "date": 1717441200,
                "edit_date": 1717441260,
                "chat": {"id": 7, "type": "private", "first_name": "Ann"},
                "from": {"id": 7, "is_bot": false, "first_name": "Ann"},
                "text": "this",
                "entities": [{"type": "text_link", "offset": 0, "length": 4, "url": "https://b.io/"}],
                "reply_to_message": {
                    "message_id": 4,
                    "date": 1717441100,
                    "chat": {"id": 7, "type": "private", "first_name": "Ann"},
                    "from": {"id": 1000, "is_bot": true, "first_name": "Goob", "username": "goob_bot"},
                    "text": "hi"
                }
            }"#,
        );

        let event = convert_message(&message);
        assert_eq!(event.chat.kind, ChatKind::Private);
        assert!(event.is_edit());
        assert!(event.is_reply_to(1000));
        assert_eq!(event.entities[0].url.as_deref(), Some("https://b.io/"));
    }

    #[test]
    fn test_parse_mode_mapping() {
        assert_eq!(
            telegram_parse_mode(ParseMode::Html),
            teloxide::types::ParseMode::Html
        );
        assert_eq!(
            telegram_parse_mode(ParseMode::MarkdownV2),
            teloxide::types::ParseMode::MarkdownV2
        );
    }
}
