//! Fire callback: drives a job through `Running` and into its outcome state.

use std::sync::Arc;
use std::time::Instant;

use cadence_executor::CommandExecutor;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    ledger::JobLedger,
    trigger::{ActiveJob, Fire, FireCallback, TriggerEngine},
    types::{JobStatus, StatusUpdate, TriggerKind},
};

/// Everything a fire needs to run one job's command.
pub struct ExecutionWrapper {
    ledger: Arc<JobLedger>,
    executor: Arc<dyn CommandExecutor>,
    task_name: String,
    command: String,
}

impl ExecutionWrapper {
    pub fn new(
        ledger: Arc<JobLedger>,
        executor: Arc<dyn CommandExecutor>,
        task_name: &str,
        command: &str,
    ) -> Self {
        Self {
            ledger,
            executor,
            task_name: task_name.to_string(),
            command: command.to_string(),
        }
    }

    pub fn into_callback(self) -> FireCallback {
        Arc::new(move |fire: &Fire, triggers: &TriggerEngine| self.on_fire(fire, triggers))
    }

    /// Runs on a worker thread and blocks until the command returns.
    ///
    /// Store errors are logged; there is no caller to hand them to.
    pub fn on_fire(&self, fire: &Fire, triggers: &TriggerEngine) {
        let job_id = fire.job_id.as_str();
        let started = Utc::now();

        let running = StatusUpdate::status(JobStatus::Running)
            .with_last_run(started)
            .with_next_run(None);
        if let Err(e) = self.ledger.set(job_id, running) {
            error!(job_id, error = %e, "failed to record running state");
        }

        let clock = Instant::now();
        let outcome = self.executor.execute(&self.task_name, &self.command);
        let duration_ms = clock.elapsed().as_millis() as u64;

        let result = self.ledger.transition(job_id, |_| {
            Some(if outcome.is_success() {
                after_success(triggers.lookup(job_id))
            } else {
                StatusUpdate::status(JobStatus::Failed).with_next_run(None)
            })
        });

        match result {
            Ok(Some(update)) if outcome.is_success() => info!(
                job_id,
                task = %self.task_name,
                duration_ms,
                status = %update.status,
                "task run finished"
            ),
            Ok(_) => warn!(
                job_id,
                task = %self.task_name,
                duration_ms,
                error = %outcome.error,
                "task run failed"
            ),
            Err(e) => error!(job_id, error = %e, "failed to record task outcome"),
        }
    }
}

/// A live registration with a future fire keeps the job scheduled: an
/// interval becomes `Recurring`, a one-shot that was re-registered while
/// this run was in flight goes back to `Pending`. Otherwise the job is done.
fn after_success(registration: Option<ActiveJob>) -> StatusUpdate {
    match registration {
        Some(ActiveJob {
            next_fire: Some(next),
            kind,
            ..
        }) => {
            let status = match kind {
                TriggerKind::Interval => JobStatus::Recurring,
                TriggerKind::OneShot => JobStatus::Pending,
            };
            StatusUpdate::status(status).with_next_run(Some(next))
        }
        _ => StatusUpdate::status(JobStatus::Completed).with_next_run(None),
    }
}
