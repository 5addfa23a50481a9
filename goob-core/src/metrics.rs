// ABOUTME: Counters and histograms for the event pipeline, recorded through the metrics facade.
// ABOUTME: No-ops until the binary installs a recorder such as the Prometheus exporter.

use metrics::{counter, histogram};
use std::time::Duration;

/// Inbound event handed to the dispatcher, before persistence
pub fn record_event_received(edit: bool) {
    let kind = if edit { "edit" } else { "message" };
    counter!("goob_events_received_total", "kind" => kind).increment(1);
}

/// Persistence outcome for a dispatched event: "persisted" or "store_failed".
pub fn record_event(outcome: &'static str) {
    counter!("goob_events_total", "outcome" => outcome).increment(1);
}

pub fn record_handler_run(handler: &str, outcome: &'static str) {
    counter!(
        "goob_handler_runs_total",
        "handler" => handler.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_handler_duration(handler: &str, duration: Duration) {
    histogram!("goob_handler_duration_seconds", "handler" => handler.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_store_retry() {
    counter!("goob_store_retries_total").increment(1);
}

pub fn record_store_error(kind: &'static str) {
    counter!("goob_store_errors_total", "kind" => kind).increment(1);
}

pub fn record_message_sent() {
    counter!("goob_messages_sent_total").increment(1);
}

pub fn record_send_failure() {
    counter!("goob_send_failures_total").increment(1);
}

/// A duplicate suppressed by one of the idempotency engines
pub fn record_duplicate(kind: &'static str) {
    counter!("goob_duplicates_suppressed_total", "kind" => kind).increment(1);
}

/// A first-seen claim won by one of the idempotency engines
pub fn record_claim(kind: &'static str) {
    counter!("goob_claims_total", "kind" => kind).increment(1);
}

/// A live announcement broadcast, with the number of chats it reached
pub fn record_announcement(delivered: usize) {
    counter!("goob_announcements_total").increment(1);
    counter!("goob_announcement_deliveries_total").increment(delivered as u64);
}

pub fn record_poll(outcome: &'static str) {
    counter!("goob_poll_cycles_total", "outcome" => outcome).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("goob_errors_total", "kind" => kind).increment(1);
}
