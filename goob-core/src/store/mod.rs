// ABOUTME: Durable SQLite store for users, chats, messages, entities, media, and claims.
// ABOUTME: Serializes writes on one connection with IMMEDIATE transactions and retries lock contention.

pub mod legacy;
pub mod retry;
pub mod schema;

use crate::error::{StoreError, StoreResult};
use crate::metrics;
use crate::model::{
    Chat, ChatId, ChatKind, EntityAnnotation, InboundEvent, Media, MediaKind, MessageId, User,
    UserId,
};
use crate::normalize::{normalize, EntityRow, MessageRow};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub use legacy::{BucketStore, LegacyWriter};
pub use retry::RetryPolicy;

/// Tunables for opening a store
#[derive(Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
    /// Receives a copy of every recorded event while a migration is pending
    pub legacy: Option<Arc<dyn LegacyWriter>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            legacy: None,
        }
    }
}

/// Outcome of the optional sub-writes made while recording an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub media_written: usize,
    pub media_failed: usize,
    /// A newer edit of the message was already stored; nothing was written
    pub superseded: bool,
}

/// Result of a check-then-claim: either this caller won, or the existing
/// record found by the check is returned untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<T> {
    Claimed,
    Existing(T),
}

impl<T> Claim<T> {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Claim::Claimed)
    }
}

/// A message read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub reply_to_message_id: Option<MessageId>,
    pub forward_from_id: Option<UserId>,
    pub forward_from_chat_id: Option<ChatId>,
    pub forward_date: Option<DateTime<Utc>>,
    pub edit_date: Option<DateTime<Utc>>,
    pub media_group_id: Option<String>,
    pub author_signature: Option<String>,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub entities: Vec<EntityAnnotation>,
    pub caption_entities: Vec<EntityAnnotation>,
    pub media: Vec<Media>,
    pub snapshot: serde_json::Value,
}

/// One line of conversation history, oldest first when returned as a list
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message_id: MessageId,
    pub sender: Option<User>,
    pub text: Option<String>,
    pub date: DateTime<Utc>,
}

struct StoreInner {
    writer: Mutex<Connection>,
    /// Separate read connection for file-backed stores; in-memory stores read
    /// through the writer
    reader: Option<Mutex<Connection>>,
    retry: RetryPolicy,
    legacy: Option<Arc<dyn LegacyWriter>>,
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

fn configure_writer(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(journal_mode = %mode, "Store journal mode set");
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(schema::SCHEMA)?;
    Ok(())
}

impl Store {
    /// Open (creating if needed) a file-backed store with one writer and one
    /// reader connection.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let writer = Connection::open(path).context("Failed to open SQLite database")?;
        configure_writer(&writer, options.busy_timeout).context("Failed to initialize schema")?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open read connection")?;
        reader.busy_timeout(options.busy_timeout)?;

        tracing::info!(
            db = %path.display(),
            legacy = options.legacy.is_some(),
            "Store initialized"
        );

        Ok(Self::from_parts(writer, Some(reader), options))
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        configure_writer(&writer, options.busy_timeout).context("Failed to initialize schema")?;
        Ok(Self::from_parts(writer, None, options))
    }

    fn from_parts(writer: Connection, reader: Option<Connection>, options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                writer: Mutex::new(writer),
                reader: reader.map(Mutex::new),
                retry: options.retry,
                legacy: options.legacy,
            }),
        }
    }

    fn lock(mutex: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
        mutex.lock().map_err(|e| {
            tracing::error!(error = %e, "Database mutex poisoned");
            StoreError::Poisoned
        })
    }

    /// Run `op` inside an IMMEDIATE transaction, retrying on lock contention.
    ///
    /// `op` may run more than once; everything it does is rolled back before
    /// each retry.
    pub fn write<T>(&self, op: impl Fn(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        self.inner.retry.run(|| {
            let mut conn = Self::lock(&self.inner.writer)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = op(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Run a read-only query on the read connection
    pub fn read<T>(&self, op: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mutex = self.inner.reader.as_ref().unwrap_or(&self.inner.writer);
        let conn = Self::lock(mutex)?;
        op(&conn)
    }

    /// Atomically check for an existing record and, when there is none, claim it.
    ///
    /// Both closures run in the same write transaction so no other caller can
    /// claim between the check and the write.
    pub fn check_then_claim<T>(
        &self,
        check: impl Fn(&Connection) -> StoreResult<Option<T>>,
        claim: impl Fn(&Connection) -> StoreResult<()>,
    ) -> StoreResult<Claim<T>> {
        self.write(|conn| {
            if let Some(existing) = check(conn)? {
                return Ok(Claim::Existing(existing));
            }
            claim(conn)?;
            Ok(Claim::Claimed)
        })
    }

    // =========================================================================
    // Event persistence
    // =========================================================================

    /// Persist an inbound event.
    ///
    /// Users, chats, the message row, and its entities commit together. Media
    /// items are written afterwards one transaction each, and the legacy copy
    /// last; failures there are logged and do not fail the call.
    ///
    /// A version older than the stored one (by edit date) leaves the message,
    /// its entities and media untouched.
    pub fn record_event(&self, event: &InboundEvent) -> StoreResult<RecordSummary> {
        let record = normalize(event)?;

        let applied = self.write(|conn| {
            for user in &record.users {
                upsert_user(conn, user)?;
            }
            for chat in &record.chats {
                insert_chat(conn, chat)?;
            }
            if !replace_message(conn, &record.message)? {
                return Ok(false);
            }
            for entity in &record.entities {
                insert_entity(conn, &record.message, entity)?;
            }
            Ok(true)
        })?;

        let mut summary = RecordSummary::default();
        if !applied {
            tracing::debug!(
                chat_id = event.chat.id,
                message_id = event.message_id,
                "Skipped message older than the stored edit"
            );
            summary.superseded = true;
            return Ok(summary);
        }

        for (position, media) in record.media.iter().enumerate() {
            let result = self.write(|conn| {
                insert_media(conn, event.chat.id, event.message_id, position, media)
            });
            match result {
                Ok(()) => summary.media_written += 1,
                Err(e) => {
                    tracing::warn!(
                        chat_id = event.chat.id,
                        message_id = event.message_id,
                        position,
                        file_id = %media.file_id,
                        error = %e,
                        "Failed to save media item"
                    );
                    metrics::record_store_error("media");
                    summary.media_failed += 1;
                }
            }
        }

        if let Some(legacy) = &self.inner.legacy {
            if let Err(e) = legacy.write_event(event) {
                tracing::warn!(
                    chat_id = event.chat.id,
                    message_id = event.message_id,
                    error = %e,
                    "Legacy store write failed"
                );
                metrics::record_store_error("legacy");
            }
        }

        tracing::debug!(
            chat_id = event.chat.id,
            message_id = event.message_id,
            edit = event.is_edit(),
            media = summary.media_written,
            "Event recorded"
        );
        Ok(summary)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, username, first_name, last_name, is_bot FROM users WHERE id = ?1",
                    params![id],
                    |row| user_from_row(row, 0),
                )
                .optional()?)
        })
    }

    pub fn get_chat(&self, id: ChatId) -> StoreResult<Option<Chat>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, type, title, username, first_name, last_name FROM chats WHERE id = ?1",
                    params![id],
                    chat_from_row,
                )
                .optional()?)
        })
    }

    /// Every chat the bot has seen, ordered by id
    pub fn list_chats(&self) -> StoreResult<Vec<Chat>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, type, title, username, first_name, last_name FROM chats ORDER BY id",
            )?;
            let chats = stmt
                .query_map([], chat_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(chats)
        })
    }

    pub fn message_exists(&self, chat_id: ChatId, message_id: MessageId) -> StoreResult<bool> {
        self.read(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE chat_id = ?1 AND id = ?2",
                    params![chat_id, message_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> StoreResult<Option<StoredMessage>> {
        self.read(|conn| {
            let message = conn
                .query_row(
                    "SELECT id, chat_id, sender_id, reply_to_message_id, forward_from_id,
                            forward_from_chat_id, forward_date, edit_date, media_group_id,
                            author_signature, unixtime, text, caption, data
                     FROM messages WHERE chat_id = ?1 AND id = ?2",
                    params![chat_id, message_id],
                    |row| {
                        let data: Option<String> = row.get(13)?;
                        let snapshot = match data {
                            Some(d) => serde_json::from_str(&d).map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(13, Type::Text, e.into())
                            })?,
                            None => serde_json::Value::Null,
                        };
                        Ok(StoredMessage {
                            message_id: row.get(0)?,
                            chat_id: row.get(1)?,
                            sender_id: row.get(2)?,
                            reply_to_message_id: row.get(3)?,
                            forward_from_id: row.get(4)?,
                            forward_from_chat_id: row.get(5)?,
                            forward_date: row.get::<_, Option<i64>>(6)?.map(from_unix),
                            edit_date: row.get::<_, Option<i64>>(7)?.map(from_unix),
                            media_group_id: row.get(8)?,
                            author_signature: row.get(9)?,
                            date: from_unix(row.get(10)?),
                            text: row.get(11)?,
                            caption: row.get(12)?,
                            entities: Vec::new(),
                            caption_entities: Vec::new(),
                            media: Vec::new(),
                            snapshot,
                        })
                    },
                )
                .optional()?;

            let Some(mut message) = message else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT e.type, e.utf16_offset, e.utf16_length, e.url, e.language, e.is_caption,
                        u.id, u.username, u.first_name, u.last_name, u.is_bot
                 FROM message_entities e
                 LEFT JOIN users u ON u.id = e.user_id
                 WHERE e.chat_id = ?1 AND e.message_id = ?2
                 ORDER BY e.position",
            )?;
            let rows = stmt.query_map(params![chat_id, message_id], |row| {
                let user = match row.get::<_, Option<i64>>(6)? {
                    Some(_) => Some(user_from_row(row, 6)?),
                    None => None,
                };
                let entity = EntityAnnotation {
                    kind: row.get(0)?,
                    offset: row.get::<_, i64>(1)? as usize,
                    length: row.get::<_, i64>(2)? as usize,
                    url: row.get(3)?,
                    user,
                    language: row.get(4)?,
                };
                Ok((entity, row.get::<_, i32>(5)? != 0))
            })?;
            for row in rows {
                let (entity, is_caption) = row?;
                if is_caption {
                    message.caption_entities.push(entity);
                } else {
                    message.entities.push(entity);
                }
            }

            let mut stmt = conn.prepare(
                "SELECT type, file_id, file_unique_id, width, height, duration, file_name,
                        mime_type, file_size, thumb_file_id
                 FROM media_items WHERE chat_id = ?1 AND message_id = ?2
                 ORDER BY position",
            )?;
            message.media = stmt
                .query_map(params![chat_id, message_id], media_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(message))
        })
    }

    /// The latest `limit` messages in a chat, oldest first
    pub fn recent_history(&self, chat_id: ChatId, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.unixtime, COALESCE(m.text, m.caption),
                        u.id, u.username, u.first_name, u.last_name, u.is_bot
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.chat_id = ?1
                 ORDER BY m.unixtime DESC, m.id DESC
                 LIMIT ?2",
            )?;
            let mut entries = stmt
                .query_map(params![chat_id, limit as i64], |row| {
                    let sender = match row.get::<_, Option<i64>>(3)? {
                        Some(_) => Some(user_from_row(row, 3)?),
                        None => None,
                    };
                    Ok(HistoryEntry {
                        message_id: row.get(0)?,
                        date: from_unix(row.get(1)?),
                        text: row.get(2)?,
                        sender,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            entries.reverse();
            Ok(entries)
        })
    }

    // =========================================================================
    // External entity cache
    // =========================================================================

    pub fn cached_entity(&self, id: &str) -> StoreResult<Option<serde_json::Value>> {
        self.read(|conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM external_entity_cache WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
        })
    }

    pub fn cache_entity(&self, id: &str, data: &serde_json::Value) -> StoreResult<()> {
        let data = serde_json::to_string(data)?;
        self.write(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO external_entity_cache (id, data, cached_at)
                 VALUES (?1, ?2, ?3)",
                params![id, data, Utc::now().timestamp()],
            )?;
            Ok(())
        })
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn user_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(start)?,
        username: row.get(start + 1)?,
        first_name: row.get::<_, Option<String>>(start + 2)?.unwrap_or_default(),
        last_name: row.get(start + 3)?,
        is_bot: row.get::<_, i32>(start + 4)? != 0,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    let kind: String = row.get(1)?;
    let kind: ChatKind = kind
        .parse()
        .map_err(|e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
    Ok(Chat {
        id: row.get(0)?,
        kind,
        title: row.get(2)?,
        username: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<Media> {
    let kind: String = row.get(0)?;
    let kind: MediaKind = kind
        .parse()
        .map_err(|e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into()))?;
    Ok(Media {
        kind,
        file_id: row.get(1)?,
        file_unique_id: row.get(2)?,
        width: row.get(3)?,
        height: row.get(4)?,
        duration: row.get(5)?,
        file_name: row.get(6)?,
        mime_type: row.get(7)?,
        file_size: row.get::<_, Option<i64>>(8)?.map(|s| s as u64),
        thumb_file_id: row.get(9)?,
    })
}

/// Users are last-write-wins: names and usernames change over time
pub(crate) fn upsert_user(conn: &Connection, user: &User) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO users (id, username, first_name, last_name, is_bot, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            is_bot = excluded.is_bot,
            data = excluded.data",
        params![
            user.id,
            user.username,
            user.first_name,
            user.last_name,
            user.is_bot as i32,
            serde_json::to_string(user)?,
        ],
    )?;
    Ok(())
}

/// Chats keep the first representation seen
fn insert_chat(conn: &Connection, chat: &Chat) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO chats (id, type, title, username, first_name, last_name, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            chat.id,
            chat.kind.to_string(),
            chat.title,
            chat.username,
            chat.first_name,
            chat.last_name,
            serde_json::to_string(chat)?,
        ],
    )?;
    Ok(())
}

/// Upsert the message row unless a newer edit is already stored.
/// Returns false for a stale version; otherwise the previous version's
/// entities and media are removed so an edit never leaves stale children.
fn replace_message(conn: &Connection, message: &MessageRow) -> StoreResult<bool> {
    let changed = conn.execute(
        "INSERT INTO messages (
            id, chat_id, sender_id, reply_to_message_id, forward_from_id, forward_from_chat_id,
            forward_date, edit_date, media_group_id, author_signature, unixtime, text, caption, data
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(id, chat_id) DO UPDATE SET
            sender_id = excluded.sender_id,
            reply_to_message_id = excluded.reply_to_message_id,
            forward_from_id = excluded.forward_from_id,
            forward_from_chat_id = excluded.forward_from_chat_id,
            forward_date = excluded.forward_date,
            edit_date = excluded.edit_date,
            media_group_id = excluded.media_group_id,
            author_signature = excluded.author_signature,
            unixtime = excluded.unixtime,
            text = excluded.text,
            caption = excluded.caption,
            data = excluded.data
         WHERE COALESCE(excluded.edit_date, 0) >= COALESCE(messages.edit_date, 0)",
        params![
            message.message_id,
            message.chat_id,
            message.sender_id,
            message.reply_to_message_id,
            message.forward_from_id,
            message.forward_from_chat_id,
            message.forward_date,
            message.edit_date,
            message.media_group_id,
            message.author_signature,
            message.unixtime,
            message.text,
            message.caption,
            message.snapshot.to_string(),
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }

    conn.execute(
        "DELETE FROM message_entities WHERE message_id = ?1 AND chat_id = ?2",
        params![message.message_id, message.chat_id],
    )?;
    conn.execute(
        "DELETE FROM media_items WHERE message_id = ?1 AND chat_id = ?2",
        params![message.message_id, message.chat_id],
    )?;
    Ok(true)
}

fn insert_entity(conn: &Connection, message: &MessageRow, entity: &EntityRow) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO message_entities (
            message_id, chat_id, position, type, utf16_offset, utf16_length, url, user_id,
            language, is_caption
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message.message_id,
            message.chat_id,
            entity.position as i64,
            entity.kind,
            entity.offset as i64,
            entity.length as i64,
            entity.url,
            entity.user_id,
            entity.language,
            entity.is_caption as i32,
        ],
    )?;
    Ok(())
}

fn insert_media(
    conn: &Connection,
    chat_id: ChatId,
    message_id: MessageId,
    position: usize,
    media: &Media,
) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO media_items (
            message_id, chat_id, position, type, file_id, file_unique_id, width, height,
            duration, file_name, mime_type, file_size, thumb_file_id, data
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            message_id,
            chat_id,
            position as i64,
            media.kind.as_str(),
            media.file_id,
            media.file_unique_id,
            media.width,
            media.height,
            media.duration,
            media.file_name,
            media.mime_type,
            media.file_size.map(|s| s as i64),
            media.thumb_file_id,
            serde_json::to_string(media)?,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory(StoreOptions::default()).unwrap()
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = store();
        let result: StoreResult<()> = store.write(|conn| {
            insert_chat(conn, &Chat::group(-1, "Room"))?;
            Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        });
        assert!(result.is_err());
        assert!(store.get_chat(-1).unwrap().is_none());
    }

    #[test]
    fn test_check_then_claim_returns_existing() {
        let store = store();
        let claim = |conn: &Connection| -> StoreResult<()> {
            conn.execute(
                "INSERT INTO notification_claims (subject, period, claimed_at) VALUES ('s', 'p', 0)",
                [],
            )?;
            Ok(())
        };
        let check = |conn: &Connection| -> StoreResult<Option<i64>> {
            Ok(conn
                .query_row(
                    "SELECT claimed_at FROM notification_claims WHERE subject = 's' AND period = 'p'",
                    [],
                    |row| row.get(0),
                )
                .optional()?)
        };

        assert_eq!(store.check_then_claim(check, claim).unwrap(), Claim::Claimed);
        assert_eq!(store.check_then_claim(check, claim).unwrap(), Claim::Existing(0));
    }

    #[test]
    fn test_entity_cache_overwrites() {
        let store = store();
        assert!(store.cached_entity("g1").unwrap().is_none());
        store.cache_entity("g1", &serde_json::json!({"name": "Chess"})).unwrap();
        store.cache_entity("g1", &serde_json::json!({"name": "Go"})).unwrap();
        assert_eq!(store.cached_entity("g1").unwrap().unwrap()["name"], "Go");
    }
}
