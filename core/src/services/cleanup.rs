//! Background cleanup of expired sessions and stale past-token rows.
//!
//! Expired session rows are only ever dead weight, but past-token rows need
//! care: they are the rotation history that theft detection reads, so a row
//! is only deleted once its session is gone and the row has aged past the
//! configured retention.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use portcullis_shared::clock::Clock;
use portcullis_shared::config::CleanupSettings;

use crate::repositories::SessionStore;

/// Outcome of a single cleanup sweep
#[derive(Debug, Default)]
pub struct CleanupResult {
    /// Session rows removed because their expiry had passed
    pub expired_sessions_deleted: u64,
    /// Past-token rows removed because their session is gone and they aged
    /// out of retention
    pub orphaned_past_tokens_deleted: u64,
    /// Any errors encountered; the sweep keeps going past individual
    /// failures
    pub errors: Vec<String>,
}

impl CleanupResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn total_cleaned(&self) -> u64 {
        self.expired_sessions_deleted + self.orphaned_past_tokens_deleted
    }
}

/// Periodic sweeper for rows no live session can ever need again.
pub struct CleanupService<S: SessionStore + 'static> {
    store: Arc<S>,
    settings: CleanupSettings,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStore> CleanupService<S> {
    pub fn new(store: Arc<S>, settings: CleanupSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }

    /// Run one sweep and report what it did.
    ///
    /// Each phase runs under the configured per-sweep timeout; a phase that
    /// fails or times out is recorded in the result and the sweep moves on.
    pub async fn run_cleanup(&self) -> CleanupResult {
        let mut result = CleanupResult::default();
        let now = self.clock.now();
        let sweep_timeout = StdDuration::from_secs(self.settings.sweep_timeout_secs);

        info!("starting cleanup sweep");

        match timeout(sweep_timeout, self.store.delete_expired_sessions(now)).await {
            Ok(Ok(deleted)) => {
                result.expired_sessions_deleted = deleted;
                if deleted > 0 {
                    info!(deleted, "expired sessions removed");
                }
            }
            Ok(Err(err)) => {
                error!(error = %err, "expired-session sweep failed");
                result.errors.push(format!("expired sessions: {err}"));
            }
            Err(_) => {
                error!("expired-session sweep timed out");
                result
                    .errors
                    .push("expired sessions: sweep timed out".to_string());
            }
        }

        let cutoff = now - self.settings.past_token_retention();
        match timeout(sweep_timeout, self.store.delete_orphaned_past_tokens(cutoff)).await {
            Ok(Ok(deleted)) => {
                result.orphaned_past_tokens_deleted = deleted;
                if deleted > 0 {
                    info!(deleted, "orphaned past tokens removed");
                }
            }
            Ok(Err(err)) => {
                error!(error = %err, "past-token sweep failed");
                result.errors.push(format!("past tokens: {err}"));
            }
            Err(_) => {
                error!("past-token sweep timed out");
                result.errors.push("past tokens: sweep timed out".to_string());
            }
        }

        if result.is_clean() {
            info!(total = result.total_cleaned(), "cleanup sweep finished");
        } else {
            warn!(
                errors = result.errors.len(),
                "cleanup sweep finished with errors"
            );
        }
        result
    }

    /// Spawn the periodic sweep loop. The first sweep runs immediately,
    /// later ones at the configured interval. Returns `None` when cleanup
    /// is disabled in the settings.
    pub fn start_background_task(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.settings.enabled {
            warn!("cleanup is disabled; no background task started");
            return None;
        }

        let interval = StdDuration::from_secs(self.settings.interval_secs);
        Some(tokio::spawn(async move {
            info!(
                interval_secs = self.settings.interval_secs,
                "cleanup task started"
            );
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_cleanup().await;
            }
        }))
    }
}
