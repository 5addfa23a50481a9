// ABOUTME: Relational schema for the conversation store.
// ABOUTME: Every row keeps an opaque JSON snapshot next to its normalized columns.

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    is_bot INTEGER NOT NULL DEFAULT 0,
    data TEXT
);

CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    title TEXT,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    data TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    sender_id INTEGER,
    reply_to_message_id INTEGER,
    forward_from_id INTEGER,
    forward_from_chat_id INTEGER,
    forward_date INTEGER,
    edit_date INTEGER,
    media_group_id TEXT,
    author_signature TEXT,
    unixtime INTEGER NOT NULL,
    text TEXT,
    caption TEXT,
    data TEXT,
    PRIMARY KEY (id, chat_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id),
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (forward_from_id) REFERENCES users(id),
    FOREIGN KEY (forward_from_chat_id) REFERENCES chats(id)
);

CREATE TABLE IF NOT EXISTS message_entities (
    message_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    type TEXT NOT NULL,
    utf16_offset INTEGER NOT NULL,
    utf16_length INTEGER NOT NULL,
    url TEXT,
    user_id INTEGER,
    language TEXT,
    is_caption INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (message_id, chat_id) REFERENCES messages(id, chat_id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS media_items (
    message_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    type TEXT NOT NULL,
    file_id TEXT NOT NULL,
    file_unique_id TEXT,
    width INTEGER,
    height INTEGER,
    duration INTEGER,
    file_name TEXT,
    mime_type TEXT,
    file_size INTEGER,
    thumb_file_id TEXT,
    data TEXT,
    PRIMARY KEY (message_id, chat_id, position),
    FOREIGN KEY (message_id, chat_id) REFERENCES messages(id, chat_id)
);

CREATE TABLE IF NOT EXISTS dupe_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    chat_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    sender_id INTEGER,
    unixtime INTEGER NOT NULL,
    UNIQUE (url, chat_id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS notification_claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject TEXT NOT NULL,
    period TEXT NOT NULL,
    claimed_at INTEGER NOT NULL,
    UNIQUE (subject, period)
);

CREATE TABLE IF NOT EXISTS external_event_state (
    subject TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    data TEXT
);

CREATE TABLE IF NOT EXISTS external_entity_cache (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_unixtime ON messages(unixtime);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);
CREATE INDEX IF NOT EXISTS idx_messages_media_group ON messages(media_group_id);
CREATE INDEX IF NOT EXISTS idx_message_entities_message ON message_entities(message_id, chat_id);
CREATE INDEX IF NOT EXISTS idx_media_items_file_id ON media_items(file_id);
";
