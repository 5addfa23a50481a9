// ABOUTME: Periodic live-status poller that announces new live sessions to every chat.
// ABOUTME: Refreshes its credential lazily and caches metadata lookups in the store.

use crate::idempotency::{ExternalEventDedupe, Observation};
use crate::metrics;
use crate::model::OutgoingMessage;
use crate::send::SendAdapter;
use crate::traits::{LiveStatus, LiveStatusProvider, Metadata};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Instant, MissedTickBehavior};

pub const UNKNOWN_METADATA: &str = "Unknown game";

/// Announcement body for a subject that just went live
pub fn format_announcement(status: &LiveStatus, metadata_name: &str) -> String {
    format!(
        "*{} is playing {}*\n{}\n{}",
        status.display_name, metadata_name, status.url, status.title
    )
}

/// Outcome of a single poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub live: usize,
    pub announced: Vec<String>,
    pub suppressed: usize,
    /// Subjects whose dedupe check or broadcast failed
    pub failed: Vec<String>,
}

pub struct LivePoller {
    provider: Arc<dyn LiveStatusProvider>,
    dedupe: ExternalEventDedupe,
    outbound: SendAdapter,
    subjects: Vec<String>,
    poll_interval: Duration,
    credential_expires: Mutex<Option<Instant>>,
}

impl LivePoller {
    pub fn new(
        provider: Arc<dyn LiveStatusProvider>,
        outbound: SendAdapter,
        subjects: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            dedupe: ExternalEventDedupe::new(outbound.store().clone()),
            outbound,
            subjects,
            poll_interval,
            credential_expires: Mutex::new(None),
        }
    }

    /// Refresh the credential only when none is held or the held one expired
    async fn ensure_credential(&self) -> Result<()> {
        let mut expires = self.credential_expires.lock().await;
        if expires.is_some_and(|at| Instant::now() < at) {
            return Ok(());
        }
        let lifetime = self
            .provider
            .refresh_credential()
            .await
            .context("Failed to refresh live-status credential")?;
        *expires = Some(Instant::now() + lifetime);
        tracing::info!(valid_for_secs = lifetime.as_secs(), "Live-status credential refreshed");
        Ok(())
    }

    /// Cached metadata name, fetching and caching it on first use
    async fn metadata_name(&self, id: &str) -> Result<String> {
        let store = self.outbound.store().clone();
        let key = id.to_string();
        let cached = tokio::task::spawn_blocking(move || store.cached_entity(&key))
            .await
            .context("Metadata cache task failed")??;
        if let Some(cached) = cached {
            let metadata: Metadata =
                serde_json::from_value(cached).context("Corrupt cached metadata")?;
            return Ok(metadata.name);
        }

        let metadata = self
            .provider
            .get_metadata(id)
            .await?
            .with_context(|| format!("No metadata for id {}", id))?;
        let store = self.outbound.store().clone();
        let key = id.to_string();
        let value = serde_json::to_value(&metadata)?;
        tokio::task::spawn_blocking(move || store.cache_entity(&key, &value))
            .await
            .context("Metadata cache task failed")??;
        Ok(metadata.name)
    }

    async fn announce(&self, status: &LiveStatus) -> Result<()> {
        let name = match status.metadata_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => match self.metadata_name(id).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(subject = %status.subject, metadata_id = id, error = %e, "Metadata lookup failed");
                    UNKNOWN_METADATA.to_string()
                }
            },
            None => UNKNOWN_METADATA.to_string(),
        };

        let message = OutgoingMessage::markdown(format_announcement(status, &name));
        let report = self.outbound.broadcast(&message).await?;
        metrics::record_announcement(report.delivered);
        tracing::info!(
            subject = %status.subject,
            delivered = report.delivered,
            failed = report.failed,
            "Live announcement sent"
        );
        Ok(())
    }

    async fn observe(&self, status: &LiveStatus) -> Result<Observation> {
        let dedupe = self.dedupe.clone();
        let subject = status.subject.clone();
        let started_at = status.started_at;
        let snapshot = serde_json::to_value(status)?;
        let observation =
            tokio::task::spawn_blocking(move || dedupe.observe(&subject, started_at, &snapshot))
                .await
                .context("Live state task failed")??;
        Ok(observation)
    }

    /// Run one poll: refresh the credential if needed, list live subjects,
    /// and announce every session not seen before.
    pub async fn poll_once(&self) -> Result<PollReport> {
        self.ensure_credential().await?;
        let live = self
            .provider
            .list_active(&self.subjects)
            .await
            .context("Failed to query live status")?;

        let mut report = PollReport {
            live: live.len(),
            ..Default::default()
        };

        for status in live {
            match self.observe(&status).await {
                Ok(Observation::Suppress) => report.suppressed += 1,
                Ok(Observation::Announce) => match self.announce(&status).await {
                    Ok(()) => report.announced.push(status.subject.clone()),
                    Err(e) => {
                        tracing::error!(subject = %status.subject, error = %e, "Live announcement failed");
                        report.failed.push(status.subject.clone());
                    }
                },
                Err(e) => {
                    tracing::error!(subject = %status.subject, error = %e, "Failed to record live state");
                    report.failed.push(status.subject.clone());
                }
            }
        }

        Ok(report)
    }

    /// Poll forever on the configured interval. Failed polls are logged and
    /// retried on the next tick.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.poll_interval.as_secs(),
            subjects = ?self.subjects,
            "Starting live-status poller"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(report) => {
                    metrics::record_poll("ok");
                    if !report.announced.is_empty() {
                        tracing::info!(announced = ?report.announced, "Live poll announced sessions");
                    }
                }
                Err(e) => {
                    metrics::record_poll("error");
                    tracing::warn!(error = %e, "Live poll failed");
                }
            }
        }
    }
}
