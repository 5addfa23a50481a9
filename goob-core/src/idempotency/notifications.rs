// ABOUTME: One-time notification claims keyed by (subject, period).
// ABOUTME: The first caller for a pair is told to notify; every later caller is not.

use crate::error::StoreResult;
use crate::metrics;
use crate::store::Store;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

#[derive(Clone)]
pub struct NotificationDedupe {
    store: Store,
}

impl NotificationDedupe {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Claim (subject, period). Returns true exactly once per pair.
    pub fn should_notify(&self, subject: &str, period: &str) -> StoreResult<bool> {
        let claim = self.store.check_then_claim(
            |conn| {
                Ok(conn
                    .query_row(
                        "SELECT claimed_at FROM notification_claims WHERE subject = ?1 AND period = ?2",
                        params![subject, period],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?)
            },
            |conn| {
                conn.execute(
                    "INSERT INTO notification_claims (subject, period, claimed_at) VALUES (?1, ?2, ?3)",
                    params![subject, period, Utc::now().timestamp()],
                )?;
                Ok(())
            },
        )?;

        let claimed = claim.is_claimed();
        if claimed {
            metrics::record_claim("notification");
            tracing::info!(subject, period, "Notification claimed");
        } else {
            metrics::record_duplicate("notification");
            tracing::debug!(subject, period, "Notification already sent");
        }
        Ok(claimed)
    }

    /// Whether a claim exists, without taking one
    pub fn is_claimed(&self, subject: &str, period: &str) -> StoreResult<bool> {
        self.store.read(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM notification_claims WHERE subject = ?1 AND period = ?2",
                    params![subject, period],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_once_per_subject_and_period() {
        let dedupe = NotificationDedupe::new(Store::open_in_memory(Default::default()).unwrap());

        assert!(!dedupe.is_claimed("birthday:-1:ann", "2024").unwrap());
        assert!(dedupe.should_notify("birthday:-1:ann", "2024").unwrap());
        assert!(!dedupe.should_notify("birthday:-1:ann", "2024").unwrap());
        assert!(!dedupe.should_notify("birthday:-1:ann", "2024").unwrap());
        assert!(dedupe.is_claimed("birthday:-1:ann", "2024").unwrap());

        assert!(dedupe.should_notify("birthday:-1:ann", "2025").unwrap());
        assert!(dedupe.should_notify("birthday:-2:ann", "2024").unwrap());
    }
}
