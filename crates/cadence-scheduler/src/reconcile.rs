//! Reconciliation loop: periodically lines stored statuses up with the
//! trigger engine's live registrations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    ledger::JobLedger,
    trigger::TriggerEngine,
    types::{CachedStatus, JobStatus, StatusUpdate},
};

/// Counters for one reconciliation cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub skipped_unknown: usize,
    pub completed: usize,
    pub advanced: usize,
}

/// Shortest period the loop will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

pub struct Reconciler {
    ledger: Arc<JobLedger>,
    triggers: Arc<TriggerEngine>,
    interval: Duration,
}

impl Reconciler {
    /// An `interval` below [`MIN_INTERVAL`] (zero included) is raised to it.
    pub fn new(ledger: Arc<JobLedger>, triggers: Arc<TriggerEngine>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, floor = ?MIN_INTERVAL, "reconcile interval too short; clamping");
        }
        Self {
            ledger,
            triggers,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// One pass over the active registrations.
    ///
    /// Registrations without a Store row are never touched. A Store error
    /// aborts the pass; the caller decides whether to try again later.
    pub fn reconcile_once(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let known = self.ledger.known_ids()?;
        let mut report = ReconcileReport::default();

        for active in self.triggers.active_jobs() {
            report.examined += 1;
            if !known.contains(&active.job_id) {
                debug!(job_id = %active.job_id, "skipping registration with no stored job");
                report.skipped_unknown += 1;
                continue;
            }

            let job_id = active.job_id.as_str();
            let applied = self.ledger.transition(job_id, |cached| {
                // Re-read under the job lock; the registration may have
                // fired or been replaced since the snapshot.
                let current = self.triggers.lookup(job_id)?;
                correction(current.next_fire, current.is_recurring(), cached, now)
            })?;

            match applied.map(|u| u.status) {
                Some(JobStatus::Completed) => report.completed += 1,
                Some(_) => report.advanced += 1,
                None => {}
            }
        }
        Ok(report)
    }

    /// Sleep-then-scan until `shutdown` broadcasts `true`.
    ///
    /// A failing cycle is logged and the loop carries on.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs_f64(), "reconciliation loop started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_once(Utc::now()) {
                        Ok(report) if report != ReconcileReport::default() => {
                            debug!(?report, "reconciliation cycle finished");
                        }
                        Ok(_) => {}
                        Err(e) => error!("reconciliation cycle skipped: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reconciliation loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// The two correction rules.
///
/// No next fire on a non-recurring job forces `Completed` with a fresh
/// `last_run`, whatever the current status is, `Failed` included. A cached
/// `Running` with a known next fire moves on to `Recurring` or `Pending`.
fn correction(
    next_fire: Option<DateTime<Utc>>,
    recurring: bool,
    cached: Option<CachedStatus>,
    now: DateTime<Utc>,
) -> Option<StatusUpdate> {
    match next_fire {
        None if !recurring => Some(
            StatusUpdate::status(JobStatus::Completed)
                .with_last_run(now)
                .with_next_run(None),
        ),
        Some(next) if cached.is_some_and(|c| c.status == JobStatus::Running) => {
            let status = if recurring {
                JobStatus::Recurring
            } else {
                JobStatus::Pending
            };
            Some(StatusUpdate::status(status).with_next_run(Some(next)))
        }
        _ => None,
    }
}
