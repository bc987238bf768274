use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_core::config::SchedulerConfig;
use cadence_executor::CommandExecutor;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    ledger::JobLedger,
    reconcile::Reconciler,
    store::StatusStore,
    trigger::{ActiveJob, TriggerEngine},
    types::{Job, Recurrence, StatusReport, TriggerSpec},
    wrapper::ExecutionWrapper,
};

struct Background {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the Store, Cache, trigger engine and reconciliation loop.
///
/// Scheduling and status queries work before [`start`](Self::start); nothing
/// fires until the background tasks are running.
pub struct SchedulerEngine {
    ledger: Arc<JobLedger>,
    triggers: Arc<TriggerEngine>,
    executor: Arc<dyn CommandExecutor>,
    config: SchedulerConfig,
    background: Mutex<Option<Background>>,
}

impl SchedulerEngine {
    /// Create an engine on `conn`, initialising the schema if needed.
    ///
    /// Zero workers or a zero reconciliation interval are rejected before
    /// the Store is touched.
    pub fn new(
        conn: Connection,
        executor: Arc<dyn CommandExecutor>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(SchedulerError::InvalidConfig("max_workers must be at least 1".into()));
        }
        if config.reconcile_interval_secs == 0 {
            return Err(SchedulerError::InvalidConfig(
                "reconcile_interval_secs must be at least 1".into(),
            ));
        }

        let store = StatusStore::new(conn)?;
        Ok(Self {
            ledger: Arc::new(JobLedger::new(store)),
            triggers: Arc::new(TriggerEngine::new()),
            executor,
            config,
            background: Mutex::new(None),
        })
    }

    /// Schedule `task_name` at `start`, repeating per the `recurrence`
    /// keyword (`none`, `hourly`, `daily`, `weekly`). Returns the job id.
    pub fn schedule(
        &self,
        task_name: &str,
        command: &str,
        start: DateTime<Utc>,
        recurrence: &str,
    ) -> Result<String> {
        let recurrence = Recurrence::parse(recurrence)?;
        self.schedule_trigger(task_name, command, TriggerSpec::from_recurrence(start, recurrence))
    }

    /// Schedule with an explicit trigger.
    ///
    /// The trigger is validated before anything is written. A job id that
    /// already exists has its Store row reset and its registration replaced.
    pub fn schedule_trigger(
        &self,
        task_name: &str,
        command: &str,
        trigger: TriggerSpec,
    ) -> Result<String> {
        trigger.validate()?;

        let job = Job::new(task_name, command, trigger.clone(), Utc::now());
        let replaced = self.ledger.record_scheduled(&job)?;

        let wrapper = ExecutionWrapper::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.executor),
            task_name,
            command,
        );
        self.triggers
            .register(&job.job_id, trigger, wrapper.into_callback())?;

        if replaced {
            warn!(job_id = %job.job_id, task = %task_name, "job id reused; previous schedule replaced");
        } else {
            info!(job_id = %job.job_id, task = %task_name, "job scheduled");
        }
        Ok(job.job_id)
    }

    pub fn status(&self, job_id: &str) -> StatusReport {
        self.ledger.status(job_id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        self.ledger.list_jobs()
    }

    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        self.triggers.active_jobs()
    }

    pub fn is_running(&self) -> bool {
        self.background
            .lock()
            .expect("engine lifecycle poisoned")
            .is_some()
    }

    /// Spawn the dispatch loop and the reconciliation loop.
    ///
    /// Must be called from inside a Tokio runtime. Calling it again while
    /// running does nothing.
    pub fn start(&self) {
        let mut background = self.background.lock().expect("engine lifecycle poisoned");
        if background.is_some() {
            warn!("scheduler engine already started");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(Arc::clone(&self.triggers).run(
            self.config.max_workers,
            Duration::from_millis(self.config.idle_poll_ms),
            shutdown_rx.clone(),
        ));
        let reconciler = Reconciler::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.triggers),
            Duration::from_secs(self.config.reconcile_interval_secs),
        );
        let reconcile = tokio::spawn(reconciler.run(shutdown_rx));

        *background = Some(Background {
            shutdown: shutdown_tx,
            tasks: vec![dispatcher, reconcile],
        });
        info!(
            max_workers = self.config.max_workers,
            reconcile_interval_secs = self.config.reconcile_interval_secs,
            "scheduler engine started"
        );
    }

    /// Signal both loops and wait for them to exit.
    ///
    /// Commands already running on a worker are not interrupted.
    pub async fn stop(&self) {
        let Some(background) = self
            .background
            .lock()
            .expect("engine lifecycle poisoned")
            .take()
        else {
            return;
        };

        let _ = background.shutdown.send(true);
        for task in background.tasks {
            if let Err(e) = task.await {
                error!("scheduler task ended abnormally: {e}");
            }
        }
        info!("scheduler engine stopped");
    }
}
