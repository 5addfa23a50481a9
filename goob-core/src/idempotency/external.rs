// ABOUTME: Tracks the last seen start time of external events such as live streams.
// ABOUTME: A new start time means a new session worth announcing; the same one is suppressed.

use crate::error::StoreResult;
use crate::metrics;
use crate::store::{Claim, Store};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Announce,
    Suppress,
}

#[derive(Clone)]
pub struct ExternalEventDedupe {
    store: Store,
}

fn format_start(started_at: DateTime<Utc>) -> String {
    started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ExternalEventDedupe {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record that `subject` is live since `started_at`.
    ///
    /// Returns Announce when no start was recorded or the recorded one
    /// differs; the new start replaces it in the same transaction.
    pub fn observe(
        &self,
        subject: &str,
        started_at: DateTime<Utc>,
        snapshot: &serde_json::Value,
    ) -> StoreResult<Observation> {
        let started = format_start(started_at);
        let data = serde_json::to_string(snapshot)?;

        let claim = self.store.check_then_claim(
            |conn| {
                let recorded: Option<String> = conn
                    .query_row(
                        "SELECT started_at FROM external_event_state WHERE subject = ?1",
                        params![subject],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(recorded.filter(|r| *r == started))
            },
            |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO external_event_state (subject, started_at, data)
                     VALUES (?1, ?2, ?3)",
                    params![subject, started, data],
                )?;
                Ok(())
            },
        )?;

        Ok(match claim {
            Claim::Claimed => {
                metrics::record_claim("external_event");
                tracing::info!(subject, started_at = %started, "New external event");
                Observation::Announce
            }
            Claim::Existing(_) => {
                metrics::record_duplicate("external_event");
                Observation::Suppress
            }
        })
    }

    pub fn last_seen(&self, subject: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let recorded: Option<String> = self.store.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT started_at FROM external_event_state WHERE subject = ?1",
                    params![subject],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        Ok(recorded
            .and_then(|r| DateTime::parse_from_rfc3339(&r).ok())
            .map(|d| d.with_timezone(&Utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_same_start_suppressed_new_start_announced() {
        let dedupe = ExternalEventDedupe::new(Store::open_in_memory(Default::default()).unwrap());
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 5, 2, 18, 0, 0).unwrap();

        assert_eq!(dedupe.observe("streamer", first, &json!({})).unwrap(), Observation::Announce);
        assert_eq!(dedupe.observe("streamer", first, &json!({})).unwrap(), Observation::Suppress);
        assert_eq!(dedupe.observe("streamer", second, &json!({})).unwrap(), Observation::Announce);
        assert_eq!(dedupe.last_seen("streamer").unwrap(), Some(second));
        assert_eq!(dedupe.last_seen("other").unwrap(), None);
    }
}
