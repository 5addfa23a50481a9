// ABOUTME: Tests for the durable store - event round trips, edits, reads, legacy dual-write, and retries
// ABOUTME: Uses on-disk SQLite databases in temp directories so WAL and the reader connection are exercised

use chrono::{TimeZone, Utc};
use goob_core::model::{
    Chat, ChatKind, EntityAnnotation, ForwardOrigin, InboundEvent, Media, MediaKind, ReplyRef, User,
};
use goob_core::store::legacy::{BucketStore, CHATS_BUCKET};
use goob_core::store::{RetryPolicy, Store, StoreOptions};
use goob_core::StoreError;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path().join("goob.sqlite"), StoreOptions::default()).unwrap()
}

fn rich_event() -> InboundEvent {
    let sender = User::new(10, "Ann").with_username("ann").with_last_name("Lee");
    let chat = Chat {
        id: -100,
        kind: ChatKind::Supergroup,
        title: Some("Room".to_string()),
        username: None,
        first_name: None,
        last_name: None,
    };
    let mut event = InboundEvent::text(42, chat, sender, "привет @bob https://example.com");
    event.date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    let mut mention = EntityAnnotation::new("text_mention", 7, 4);
    mention.user = Some(User::new(11, "Bob"));
    event.entities.push(mention);
    event.entities.push(EntityAnnotation::url(12, 19));

    event.caption = Some("подпись".to_string());
    event.caption_entities.push(EntityAnnotation::new("italic", 0, 7));

    let mut photo = Media::new(MediaKind::Photo, "file-1");
    photo.width = Some(800);
    photo.height = Some(600);
    photo.file_size = Some(12_345);
    event.media.push(photo);
    event.media.push(Media::new(MediaKind::Document, "file-2"));

    event.reply_to = Some(ReplyRef {
        message_id: 41,
        sender: None,
    });
    event.forward = Some(ForwardOrigin {
        user: Some(User::new(12, "Cy")),
        chat: Some(Chat::group(-200, "Elsewhere")),
        date: Utc.with_ymd_and_hms(2024, 2, 1, 8, 30, 0).unwrap(),
    });
    event.media_group_id = Some("album-7".to_string());
    event.author_signature = Some("Ann".to_string());
    event
}

#[test]
fn test_record_event_round_trips_every_field() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let event = rich_event();

    let summary = store.record_event(&event).unwrap();
    assert_eq!(summary.media_written, 2);
    assert_eq!(summary.media_failed, 0);

    let stored = store.get_message(-100, 42).unwrap().expect("message stored");
    assert_eq!(stored.sender_id, Some(10));
    assert_eq!(stored.date, event.date);
    assert_eq!(stored.text, event.text);
    assert_eq!(stored.caption, event.caption);
    assert_eq!(stored.entities, event.entities);
    assert_eq!(stored.caption_entities, event.caption_entities);
    assert_eq!(stored.media, event.media);
    assert_eq!(stored.reply_to_message_id, Some(41));
    assert_eq!(stored.forward_from_id, Some(12));
    assert_eq!(stored.forward_from_chat_id, Some(-200));
    assert_eq!(stored.forward_date, event.forward.as_ref().map(|f| f.date));
    assert_eq!(stored.edit_date, None);
    assert_eq!(stored.media_group_id.as_deref(), Some("album-7"));
    assert_eq!(stored.author_signature.as_deref(), Some("Ann"));
    assert_eq!(stored.snapshot["message_id"], 42);

    assert_eq!(store.get_user(10).unwrap(), event.sender);
    assert_eq!(store.get_user(11).unwrap().unwrap().first_name, "Bob");
    assert_eq!(store.get_user(12).unwrap().unwrap().first_name, "Cy");
    assert_eq!(store.get_chat(-100).unwrap(), Some(event.chat.clone()));
    assert!(store.get_chat(-200).unwrap().is_some());
    assert!(store.message_exists(-100, 42).unwrap());
    assert!(!store.message_exists(-100, 43).unwrap());
}

#[test]
fn test_message_ids_are_scoped_per_chat() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let user = User::new(1, "Ann");

    store
        .record_event(&InboundEvent::text(1, Chat::group(-1, "A"), user.clone(), "in a"))
        .unwrap();
    store
        .record_event(&InboundEvent::text(1, Chat::group(-2, "B"), user, "in b"))
        .unwrap();

    assert_eq!(store.get_message(-1, 1).unwrap().unwrap().text.as_deref(), Some("in a"));
    assert_eq!(store.get_message(-2, 1).unwrap().unwrap().text.as_deref(), Some("in b"));
}

#[test]
fn test_edit_replaces_message_entities_and_media() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let event = rich_event();
    store.record_event(&event).unwrap();

    let mut edited = event.clone();
    edited.text = Some("fixed typo".to_string());
    edited.entities = vec![EntityAnnotation::new("bold", 0, 5)];
    edited.caption_entities.clear();
    edited.media.truncate(1);
    edited.edit_date = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap());
    store.record_event(&edited).unwrap();

    let stored = store.get_message(-100, 42).unwrap().unwrap();
    assert_eq!(stored.text.as_deref(), Some("fixed typo"));
    assert_eq!(stored.entities.len(), 1);
    assert_eq!(stored.entities[0].kind, "bold");
    assert!(stored.caption_entities.is_empty());
    assert_eq!(stored.media.len(), 1);
    assert_eq!(stored.edit_date, edited.edit_date);
}

#[test]
fn test_late_original_does_not_overwrite_edit() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let original = rich_event();

    let mut edited = original.clone();
    edited.text = Some("edited".to_string());
    edited.entities = vec![EntityAnnotation::new("bold", 0, 6)];
    edited.caption_entities.clear();
    edited.media.truncate(1);
    edited.edit_date = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap());

    let summary = store.record_event(&edited).unwrap();
    assert!(!summary.superseded);
    let summary = store.record_event(&original).unwrap();
    assert!(summary.superseded);
    assert_eq!(summary.media_written, 0);

    let stored = store.get_message(-100, 42).unwrap().unwrap();
    assert_eq!(stored.text.as_deref(), Some("edited"));
    assert_eq!(stored.edit_date, edited.edit_date);
    assert_eq!(stored.entities.len(), 1);
    assert_eq!(stored.entities[0].kind, "bold");
    assert_eq!(stored.media.len(), 1);

    let mut older_edit = edited.clone();
    older_edit.text = Some("first edit".to_string());
    older_edit.edit_date = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 0).unwrap());
    assert!(store.record_event(&older_edit).unwrap().superseded);
    assert_eq!(
        store.get_message(-100, 42).unwrap().unwrap().text.as_deref(),
        Some("edited")
    );
}

#[test]
fn test_users_update_but_chats_keep_first_seen() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let before = User::new(5, "Ann").with_username("ann_old");
    store
        .record_event(&InboundEvent::text(1, Chat::group(-1, "First title"), before, "one"))
        .unwrap();

    let after = User::new(5, "Ann").with_username("ann_new");
    store
        .record_event(&InboundEvent::text(2, Chat::group(-1, "Second title"), after, "two"))
        .unwrap();

    assert_eq!(store.get_user(5).unwrap().unwrap().username.as_deref(), Some("ann_new"));
    assert_eq!(store.get_chat(-1).unwrap().unwrap().title.as_deref(), Some("First title"));
}

#[test]
fn test_recent_history_oldest_first_with_senders() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let chat = Chat::group(-1, "Room");
    let ann = User::new(1, "Ann");
    let bob = User::new(2, "Bob");

    for (i, (user, text)) in [(&ann, "first"), (&bob, "second"), (&ann, "third")]
        .into_iter()
        .enumerate()
    {
        let mut event = InboundEvent::text(i as i64 + 1, chat.clone(), user.clone(), text);
        event.date = Utc.with_ymd_and_hms(2024, 1, 1, 10, i as u32, 0).unwrap();
        store.record_event(&event).unwrap();
    }

    let history = store.recent_history(-1, 2).unwrap();
    let texts: Vec<_> = history.iter().map(|h| h.text.clone().unwrap()).collect();
    assert_eq!(texts, vec!["second", "third"]);
    assert_eq!(history[0].sender.as_ref().unwrap().first_name, "Bob");

    assert!(store.recent_history(-999, 10).unwrap().is_empty());
}

#[test]
fn test_list_chats_ordered_by_id() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let user = User::new(1, "Ann");
    for chat_id in [-5, -100, 7] {
        store
            .record_event(&InboundEvent::text(1, Chat::group(chat_id, "c"), user.clone(), "hi"))
            .unwrap();
    }
    let ids: Vec<i64> = store.list_chats().unwrap().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![-100, -5, 7]);
}

#[test]
fn test_reopen_keeps_data() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        store.record_event(&rich_event()).unwrap();
    }
    let store = open_store(&dir);
    assert!(store.message_exists(-100, 42).unwrap());
}

#[test]
fn test_legacy_dual_write() {
    let dir = TempDir::new().unwrap();
    let legacy = Arc::new(BucketStore::open(dir.path().join("legacy.sqlite")).unwrap());
    let options = StoreOptions {
        legacy: Some(legacy.clone()),
        ..Default::default()
    };
    let store = Store::open(dir.path().join("goob.sqlite"), options).unwrap();

    store.record_event(&rich_event()).unwrap();

    let messages = legacy.read_bucket("-100").unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message_id"], 42);
    assert_eq!(legacy.read_bucket(CHATS_BUCKET).unwrap().len(), 1);
}

struct BrokenLegacy;

impl goob_core::store::LegacyWriter for BrokenLegacy {
    fn write_event(&self, _event: &InboundEvent) -> anyhow::Result<()> {
        anyhow::bail!("legacy disk full")
    }
}

#[test]
fn test_legacy_failure_does_not_fail_record() {
    let dir = TempDir::new().unwrap();
    let options = StoreOptions {
        legacy: Some(Arc::new(BrokenLegacy)),
        ..Default::default()
    };
    let store = Store::open(dir.path().join("goob.sqlite"), options).unwrap();

    store.record_event(&rich_event()).unwrap();
    assert!(store.message_exists(-100, 42).unwrap());
}

fn contended_options(backoff_ms: u64) -> StoreOptions {
    StoreOptions {
        busy_timeout: Duration::ZERO,
        retry: RetryPolicy::new(3, Duration::from_millis(backoff_ms)),
        legacy: None,
    }
}

#[test]
fn test_write_gives_up_while_another_connection_holds_the_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("goob.sqlite");
    let store = Store::open(&path, contended_options(1)).unwrap();

    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let result = store.record_event(&rich_event());
    match result {
        Err(StoreError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    blocker.execute_batch("ROLLBACK").unwrap();
    store.record_event(&rich_event()).unwrap();
}

#[test]
fn test_write_succeeds_once_lock_is_released_during_backoff() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("goob.sqlite");
    let store = Store::open(&path, contended_options(100)).unwrap();

    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        blocker.execute_batch("ROLLBACK").unwrap();
    });

    store.record_event(&rich_event()).unwrap();
    release.join().unwrap();
    assert!(store.message_exists(-100, 42).unwrap());
}
