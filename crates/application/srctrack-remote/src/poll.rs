use std::collections::BTreeSet;
use std::time::Duration;

use srctrack_core::key::keys_match;
use srctrack_core::{MetadataRegistry, RemoteSyncInput, TrackingEvent};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::expected::{expected_keys, group_by_type};
use crate::{merge, RemoteTrackingError, RemoteTrackingService};

/// How a convergence poll ended. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Polling is disabled by configuration.
    Skipped,
    /// Every expected key was observed.
    Converged { observed: usize, polls: u32 },
    TimedOut { missing: Vec<String>, elapsed: Duration },
    /// Too many consecutive empty polls after the feed started answering.
    EmptyLimit { missing: Vec<String>, polls: u32 },
}

impl PollOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, PollOutcome::Converged { .. })
    }

    /// Keys that never showed up.
    pub fn missing(&self) -> &[String] {
        match self {
            PollOutcome::TimedOut { missing, .. } | PollOutcome::EmptyLimit { missing, .. } => missing,
            _ => &[],
        }
    }
}

/// Remove every outstanding key matching `key`, returning whether one matched.
fn observe(outstanding: &mut BTreeSet<String>, key: &str) -> bool {
    let hits: Vec<String> = outstanding
        .iter()
        .filter(|o| keys_match(o, key))
        .cloned()
        .collect();
    for hit in &hits {
        outstanding.remove(hit);
    }
    !hits.is_empty()
}

impl RemoteTrackingService {
    /// Poll the feed until the records a caller expects have all appeared.
    ///
    /// Stops when every expected key was seen, after the configured number of
    /// consecutive empty polls (counted only once the feed returned something), or
    /// when the timeout elapses. Observed expected records are marked synced.
    ///
    /// Only rows above the high-water revision count as observed. A record an
    /// earlier retrieval already pulled in predates the caller's change.
    pub async fn poll_for_convergence(
        &self,
        expected: &[RemoteSyncInput],
        registry: &dyn MetadataRegistry,
    ) -> Result<PollOutcome, RemoteTrackingError> {
        let config = self.config();
        if !config.remote_polling {
            debug!("remote polling disabled");
            return Ok(PollOutcome::Skipped);
        }
        let mut outstanding = expected_keys(expected, registry, &config.quirks);
        let total = outstanding.len();
        if total == 0 {
            return Ok(PollOutcome::Converged { observed: 0, polls: 0 });
        }

        let timeout = config.poll_timeout_for(total);
        let start = Instant::now();
        info!(org = %self.org(), expected = total, timeout_secs = timeout.as_secs(), "polling for remote changes");

        let mut polls: u32 = 0;
        let mut empty_streak: u32 = 0;
        let mut saw_rows = false;
        loop {
            if outstanding.is_empty() {
                info!(org = %self.org(), polls, "remote changes converged");
                return Ok(PollOutcome::Converged { observed: total, polls });
            }

            polls += 1;
            let mut slot = self.lock().await?;
            let from = slot.state.server_max_revision;
            let records = self.feed.query_from(from).await?;
            if records.is_empty() {
                if saw_rows {
                    empty_streak += 1;
                }
            } else {
                saw_rows = true;
                empty_streak = 0;
                let keys = merge(&mut slot.state, records, false)?;
                for key in keys {
                    if observe(&mut outstanding, &key) {
                        if let Some(record) = slot.state.records.get_mut(&key) {
                            record.mark_synced();
                        }
                    }
                }
                self.persist(&slot.state).await?;
            }
            drop(slot);
            debug!(poll = polls, remaining = outstanding.len(), "remote poll complete");

            if outstanding.is_empty() {
                continue;
            }
            if saw_rows && empty_streak >= config.poll_empty_limit {
                let missing: Vec<String> = outstanding.into_iter().collect();
                warn!(
                    missing = ?group_by_type(&missing),
                    polls,
                    "remote feed stopped returning changes before all expected changes appeared"
                );
                self.telemetry().emit(TrackingEvent::PollingEmptyLimit {
                    missing: missing.clone(),
                    polls,
                });
                return Ok(PollOutcome::EmptyLimit { missing, polls });
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                let missing: Vec<String> = outstanding.into_iter().collect();
                warn!(
                    missing = ?group_by_type(&missing),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "timed out waiting for remote changes to appear"
                );
                self.telemetry().emit(TrackingEvent::PollingTimeout {
                    missing: missing.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                });
                return Ok(PollOutcome::TimedOut { missing, elapsed });
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    }
}
