// ABOUTME: Tests for the live-status poller - announce-once semantics, credential refresh, and metadata caching
// ABOUTME: Runs against FakeLiveStatus and RecordingSender with an in-memory store

use chrono::{TimeZone, Utc};
use goob_core::model::{Chat, InboundEvent, ParseMode, User};
use goob_core::poller::LivePoller;
use goob_core::send::SendAdapter;
use goob_core::store::{RetryPolicy, Store, StoreOptions};
use goob_core::testing::{live_status, memory_store, FakeLiveStatus, RecordingSender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    provider: Arc<FakeLiveStatus>,
    sender: Arc<RecordingSender>,
    poller: LivePoller,
}

fn fixture(credential_lifetime: Duration) -> Fixture {
    let store = memory_store();
    for chat_id in [-1, -2] {
        store
            .record_event(&InboundEvent::text(1, Chat::group(chat_id, "c"), User::new(7, "Ann"), "hi"))
            .unwrap();
    }
    let provider = Arc::new(FakeLiveStatus::new(credential_lifetime));
    let sender = Arc::new(RecordingSender::new());
    let poller = LivePoller::new(
        provider.clone(),
        SendAdapter::new(sender.clone(), store),
        vec!["streamer".to_string(), "quiet".to_string()],
        Duration::from_secs(10),
    );
    Fixture {
        provider,
        sender,
        poller,
    }
}

#[tokio::test]
async fn test_same_session_announced_once_new_session_again() {
    let f = fixture(Duration::from_secs(3600));
    f.provider.add_metadata("743", "Chess");
    let monday = Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap();
    f.provider.set_live(vec![live_status("streamer", monday, Some("743"))]);

    let report = f.poller.poll_once().await.unwrap();
    assert_eq!(report.announced, vec!["streamer"]);
    assert_eq!(f.sender.sent().len(), 2);

    let report = f.poller.poll_once().await.unwrap();
    assert!(report.announced.is_empty());
    assert_eq!(report.suppressed, 1);
    assert_eq!(f.sender.sent().len(), 2);

    let tuesday = Utc.with_ymd_and_hms(2024, 6, 4, 19, 0, 0).unwrap();
    f.provider.set_live(vec![live_status("streamer", tuesday, Some("743"))]);
    let report = f.poller.poll_once().await.unwrap();
    assert_eq!(report.announced, vec!["streamer"]);
    assert_eq!(f.sender.sent().len(), 4);

    let (_, message) = &f.sender.sent()[0];
    assert_eq!(message.parse_mode, Some(ParseMode::Markdown));
    assert_eq!(
        message.text,
        "*streamer is playing Chess*\nhttps://www.twitch.tv/streamer\nstreamer stream"
    );
}

#[tokio::test]
async fn test_credential_refreshed_lazily() {
    let f = fixture(Duration::from_secs(3600));
    f.poller.poll_once().await.unwrap();
    f.poller.poll_once().await.unwrap();
    assert_eq!(f.provider.refreshes(), 1);

    let expired = fixture(Duration::ZERO);
    expired.poller.poll_once().await.unwrap();
    expired.poller.poll_once().await.unwrap();
    assert_eq!(expired.provider.refreshes(), 2);
}

#[tokio::test]
async fn test_metadata_fetched_once_then_cached() {
    let f = fixture(Duration::from_secs(3600));
    f.provider.add_metadata("743", "Chess");
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap();

    f.provider.set_live(vec![live_status("streamer", start, Some("743"))]);
    f.poller.poll_once().await.unwrap();
    f.provider.set_live(vec![live_status("quiet", start, Some("743"))]);
    f.poller.poll_once().await.unwrap();

    assert_eq!(f.provider.metadata_lookups(), 1);
    assert!(f.sender.texts().iter().all(|t| t.contains("playing Chess")));
}

#[tokio::test]
async fn test_unknown_metadata_falls_back() {
    let f = fixture(Duration::from_secs(3600));
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap();
    f.provider.set_live(vec![
        live_status("streamer", start, Some("missing")),
        live_status("quiet", start, None),
    ]);

    let report = f.poller.poll_once().await.unwrap();
    assert_eq!(report.announced.len(), 2);
    assert!(f
        .sender
        .texts()
        .iter()
        .all(|t| t.contains("is playing Unknown game")));
}

#[tokio::test]
async fn test_listing_failure_is_an_error_and_next_poll_recovers() {
    let f = fixture(Duration::from_secs(3600));
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap();
    f.provider.set_live(vec![live_status("streamer", start, None)]);

    f.provider.fail_listing(true);
    assert!(f.poller.poll_once().await.is_err());
    assert!(f.sender.sent().is_empty());

    f.provider.fail_listing(false);
    let report = f.poller.poll_once().await.unwrap();
    assert_eq!(report.announced, vec!["streamer"]);
}

#[tokio::test]
async fn test_subjects_outside_watch_list_ignored() {
    let f = fixture(Duration::from_secs(3600));
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap();
    f.provider.set_live(vec![live_status("stranger", start, None)]);

    let report = f.poller.poll_once().await.unwrap();
    assert_eq!(report.live, 0);
    assert!(f.sender.sent().is_empty());
}

#[tokio::test]
async fn test_locked_store_does_not_stall_the_runtime() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("goob.sqlite");
    let options = StoreOptions {
        busy_timeout: Duration::from_millis(150),
        retry: RetryPolicy::new(2, Duration::from_millis(50)),
        legacy: None,
    };
    let store = Store::open(&path, options).unwrap();
    store
        .record_event(&InboundEvent::text(1, Chat::group(-1, "c"), User::new(7, "Ann"), "hi"))
        .unwrap();

    let provider = Arc::new(FakeLiveStatus::new(Duration::from_secs(3600)));
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap();
    provider.set_live(vec![live_status("streamer", start, None)]);
    let sender = Arc::new(RecordingSender::new());
    let poller = LivePoller::new(
        provider,
        SendAdapter::new(sender.clone(), store),
        vec!["streamer".to_string()],
        Duration::from_secs(10),
    );

    let blocker = rusqlite::Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let sibling = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let report = poller.poll_once().await.unwrap();
    sibling.abort();
    blocker.execute_batch("ROLLBACK").unwrap();

    assert_eq!(report.failed, vec!["streamer"]);
    assert!(sender.sent().is_empty());
    assert!(ticks.load(Ordering::SeqCst) > 0);
}
