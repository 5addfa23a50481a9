// ABOUTME: Deduplication engines built on the store's check-then-claim primitive.
// ABOUTME: Link dedupe, one-time notification claims, and external-event start tracking.

pub mod external;
pub mod links;
pub mod notifications;

pub use external::{ExternalEventDedupe, Observation};
pub use links::{normalize_url, DupeLink, LinkCheck, LinkDedupe, LinkOutcome};
pub use notifications::NotificationDedupe;
