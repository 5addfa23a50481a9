// ABOUTME: Secondary writer for the legacy chat-bucketed key/value layout.
// ABOUTME: Only active while a migration is pending; handlers never see it directly.

use crate::model::InboundEvent;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Bucket holding one entry per known chat
pub const CHATS_BUCKET: &str = "chats";

/// A store that receives a copy of every recorded event.
pub trait LegacyWriter: Send + Sync {
    fn write_event(&self, event: &InboundEvent) -> Result<()>;
}

/// Key/value buckets keyed by chat id, one row per (bucket, key).
///
/// Messages land in the bucket named after their chat id. The chat itself is
/// saved to the `chats` bucket the first time it is seen.
pub struct BucketStore {
    conn: Mutex<Connection>,
}

impl BucketStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create legacy store directory")?;
        }
        let conn = Connection::open(path).context("Failed to open legacy store")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS buckets (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (bucket, key)
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Every value in a bucket, ordered by key. Used when migrating out.
    pub fn read_bucket(&self, bucket: &str) -> Result<Vec<serde_json::Value>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Legacy store mutex poisoned: {}", e))?;
        let mut stmt = conn.prepare("SELECT value FROM buckets WHERE bucket = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![bucket], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|v| serde_json::from_str(v).context("Corrupt legacy value"))
            .collect()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Legacy store mutex poisoned: {}", e))?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM buckets WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|v| serde_json::from_str(&v).context("Corrupt legacy value"))
            .transpose()
    }
}

impl LegacyWriter for BucketStore {
    fn write_event(&self, event: &InboundEvent) -> Result<()> {
        let message = match &event.raw {
            Some(raw) => raw.to_string(),
            None => serde_json::to_string(event)?,
        };
        let chat = serde_json::to_string(&event.chat)?;
        let bucket = event.chat.id.to_string();

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Legacy store mutex poisoned: {}", e))?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO buckets (bucket, key, value) VALUES (?1, ?2, ?3)",
            params![bucket, event.message_id.to_string(), message],
        )?;
        let added = tx.execute(
            "INSERT OR IGNORE INTO buckets (bucket, key, value) VALUES (?1, ?2, ?3)",
            params![CHATS_BUCKET, bucket, chat],
        )?;
        tx.commit()?;

        if added > 0 {
            tracing::info!(chat_id = event.chat.id, "Legacy chat list updated");
        }
        Ok(())
    }
}
