//! Periodic eviction of idle SSE sessions.
//!
//! Every node runs its own reaper against the shared store. Sweeps on
//! different nodes may overlap; removal is idempotent so the only cost is a
//! redundant delete.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use streamgate_store::SessionStore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::SessionManager;
use crate::types::{ReaperConfig, SweepReport};

/// Removes SSE sessions that have been silent for longer than the timeout window.
pub struct SessionReaper<S> {
    manager: Arc<SessionManager<S>>,
    config: ReaperConfig,
}

impl<S: SessionStore + 'static> SessionReaper<S> {
    /// Create a reaper that removes sessions through `manager`.
    #[must_use]
    pub fn new(manager: Arc<SessionManager<S>>, config: ReaperConfig) -> Self {
        Self { manager, config }
    }

    /// The configured timing.
    #[must_use]
    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Oldest `last_active_at` that survives a sweep at `now`.
    fn threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.config.timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run one sweep as of the current time.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as of `now`.
    ///
    /// A failure to list the store skips the sweep. A failure to remove one
    /// session is counted and the sweep continues.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let threshold = self.threshold(now);

        let records = match self.manager.store().list_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to list sessions, skipping sweep");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            scanned: records.len(),
            ..SweepReport::default()
        };

        for record in records.iter().filter(|r| r.is_expired(threshold)) {
            report.expired += 1;
            if self.manager.remove_session(&record.session_id).await {
                debug!(
                    session_id = %record.session_id,
                    owner = %record.owner,
                    last_active_at = %record.last_active_at,
                    "Evicted idle session"
                );
                report.cleaned += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.expired > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                cleaned = report.cleaned,
                failed = report.failed,
                "Session sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "Session sweep found nothing to evict");
        }

        report
    }

    /// Sweep forever on the configured schedule.
    pub async fn run(self: Arc<Self>) {
        let start = Instant::now() + self.config.initial_delay;
        let mut ticker = tokio::time::interval_at(start, self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            period = ?self.config.period,
            initial_delay = ?self.config.initial_delay,
            timeout = ?self.config.timeout,
            "Session reaper started"
        );

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
