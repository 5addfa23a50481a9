// ABOUTME: Flattens an InboundEvent into the rows the store writes.
// ABOUTME: Collects every referenced user and chat so message rows never dangle.

use crate::model::{Chat, ChatId, EntityAnnotation, InboundEvent, Media, MessageId, User, UserId};
use serde_json::Value;

/// Message columns, one row per (message id, chat id)
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub reply_to_message_id: Option<MessageId>,
    pub forward_from_id: Option<UserId>,
    pub forward_from_chat_id: Option<ChatId>,
    pub forward_date: Option<i64>,
    pub edit_date: Option<i64>,
    pub media_group_id: Option<String>,
    pub author_signature: Option<String>,
    pub unixtime: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub snapshot: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub position: usize,
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    pub url: Option<String>,
    pub user_id: Option<UserId>,
    pub language: Option<String>,
    pub is_caption: bool,
}

/// Everything one event writes. Users and chats are listed before the
/// message so foreign keys resolve inside a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub users: Vec<User>,
    pub chats: Vec<Chat>,
    pub message: MessageRow,
    pub entities: Vec<EntityRow>,
    pub media: Vec<Media>,
}

fn push_user(users: &mut Vec<User>, user: &User) {
    // Later references replace earlier ones; the sender is pushed last so it wins
    users.retain(|u| u.id != user.id);
    users.push(user.clone());
}

fn push_chat(chats: &mut Vec<Chat>, chat: &Chat) {
    if !chats.iter().any(|c| c.id == chat.id) {
        chats.push(chat.clone());
    }
}

fn entity_rows(entities: &[EntityAnnotation], is_caption: bool, start: usize) -> Vec<EntityRow> {
    entities
        .iter()
        .enumerate()
        .map(|(i, e)| EntityRow {
            position: start + i,
            kind: e.kind.clone(),
            offset: e.offset,
            length: e.length,
            url: e.url.clone(),
            user_id: e.user.as_ref().map(|u| u.id),
            language: e.language.clone(),
            is_caption,
        })
        .collect()
}

/// Build the write set for `event`.
pub fn normalize(event: &InboundEvent) -> Result<EventRecord, serde_json::Error> {
    let mut users = Vec::new();
    let mut chats = Vec::new();

    for entity in event.entities.iter().chain(event.caption_entities.iter()) {
        if let Some(user) = &entity.user {
            push_user(&mut users, user);
        }
    }

    if let Some(forward) = &event.forward {
        if let Some(user) = &forward.user {
            push_user(&mut users, user);
        }
        if let Some(chat) = &forward.chat {
            push_chat(&mut chats, chat);
        }
    }

    if let Some(sender) = &event.sender {
        push_user(&mut users, sender);
    }
    push_chat(&mut chats, &event.chat);

    let snapshot = match &event.raw {
        Some(raw) => raw.clone(),
        None => serde_json::to_value(event)?,
    };

    let message = MessageRow {
        message_id: event.message_id,
        chat_id: event.chat.id,
        sender_id: event.sender.as_ref().map(|u| u.id),
        reply_to_message_id: event.reply_to.as_ref().map(|r| r.message_id),
        forward_from_id: event
            .forward
            .as_ref()
            .and_then(|f| f.user.as_ref())
            .map(|u| u.id),
        forward_from_chat_id: event
            .forward
            .as_ref()
            .and_then(|f| f.chat.as_ref())
            .map(|c| c.id),
        forward_date: event.forward.as_ref().map(|f| f.date.timestamp()),
        edit_date: event.edit_date.map(|d| d.timestamp()),
        media_group_id: event.media_group_id.clone(),
        author_signature: event.author_signature.clone(),
        unixtime: event.date.timestamp(),
        text: event.text.clone(),
        caption: event.caption.clone(),
        snapshot,
    };

    let mut entities = entity_rows(&event.entities, false, 0);
    entities.extend(entity_rows(&event.caption_entities, true, entities.len()));

    Ok(EventRecord {
        users,
        chats,
        message,
        entities,
        media: event.media.clone(),
    })
}
