// ABOUTME: Exponential backoff for store writes that hit SQLite lock contention.
// ABOUTME: Only transient busy/locked errors are retried; anything else surfaces immediately.

use crate::error::{StoreError, StoreResult};
use crate::metrics;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Blocks the calling thread while backing off; async callers run store
    /// work on the blocking pool.
    pub fn run<T>(&self, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt >= self.max_attempts {
                        tracing::error!(attempts = attempt, error = %err, "Store write gave up after retries");
                        return Err(StoreError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Store busy, retrying"
                    );
                    metrics::record_store_retry();
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
