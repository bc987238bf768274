use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SchedulerError},
    schedule::nth_fire,
};

/// Named repeat periods accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Hourly,
    Daily,
    Weekly,
}

impl Recurrence {
    pub fn every_secs(self) -> i64 {
        match self {
            Recurrence::Hourly => 3_600,
            Recurrence::Daily => 86_400,
            Recurrence::Weekly => 604_800,
        }
    }

    /// Parse a recurrence keyword. `"none"` and the empty string mean
    /// "run once" and yield `Ok(None)`; anything unknown is rejected.
    pub fn parse(keyword: &str) -> Result<Option<Self>> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(None),
            "hourly" => Ok(Some(Recurrence::Hourly)),
            "daily" => Ok(Some(Recurrence::Daily)),
            "weekly" => Ok(Some(Recurrence::Weekly)),
            other => Err(SchedulerError::InvalidSchedule(format!(
                "unknown recurrence: {other}"
            ))),
        }
    }
}

/// Defines when a job becomes due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fire exactly once at the given UTC instant.
    OneShot { at: DateTime<Utc> },

    /// Fire at `start + n * every_secs` for n = 0, 1, 2, …
    Interval {
        every_secs: i64,
        start: DateTime<Utc>,
    },
}

impl TriggerSpec {
    pub fn from_recurrence(start: DateTime<Utc>, recurrence: Option<Recurrence>) -> Self {
        match recurrence {
            None => TriggerSpec::OneShot { at: start },
            Some(r) => TriggerSpec::Interval {
                every_secs: r.every_secs(),
                start,
            },
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerSpec::OneShot { .. } => TriggerKind::OneShot,
            TriggerSpec::Interval { .. } => TriggerKind::Interval,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.kind() == TriggerKind::Interval
    }

    /// The instant the first fire is due.
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            TriggerSpec::OneShot { at } => *at,
            TriggerSpec::Interval { start, .. } => *start,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TriggerSpec::OneShot { .. } => Ok(()),
            TriggerSpec::Interval { every_secs, .. } if *every_secs <= 0 => {
                Err(SchedulerError::InvalidSchedule(format!(
                    "interval period must be positive, got {every_secs}s"
                )))
            }
            TriggerSpec::Interval { every_secs, start } => {
                // A grid without a second point would never fire again.
                match nth_fire(*start, *every_secs, 1) {
                    Some(_) => Ok(()),
                    None => Err(SchedulerError::InvalidSchedule(format!(
                        "interval period of {every_secs}s is out of range"
                    ))),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    OneShot,
    Interval,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its first (or next) fire.
    Pending,
    /// A fire callback has started and not yet resolved.
    Running,
    /// One-shot job whose single run succeeded.
    Completed,
    /// Last execution returned an error.
    Failed,
    /// Interval job whose last run succeeded; more fires are scheduled.
    Recurring,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Recurring => "recurring",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "recurring" => Ok(JobStatus::Recurring),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Deterministic job identifier: `{task_name}_{epoch seconds of start}`.
///
/// Two requests for the same task in the same second share an id.
pub fn job_id_for(task_name: &str, start: DateTime<Utc>) -> String {
    format!("{task_name}_{}", start.timestamp())
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Deterministic id, see [`job_id_for`].
    pub job_id: String,
    /// Catalog name of the operation.
    pub task_name: String,
    /// Shell command resolved from the catalog at schedule time.
    pub command: String,
    pub trigger: TriggerSpec,
    pub status: JobStatus,
    /// Start of the most recent fire, if any.
    pub last_run: Option<DateTime<Utc>>,
    /// Next planned fire; `None` when terminal or mid-execution.
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly scheduled job: `Pending`, next run at the trigger start.
    pub fn new(
        task_name: &str,
        command: &str,
        trigger: TriggerSpec,
        now: DateTime<Utc>,
    ) -> Self {
        let start = trigger.start();
        Self {
            job_id: job_id_for(task_name, start),
            task_name: task_name.to_string(),
            command: command.to_string(),
            status: JobStatus::Pending,
            last_run: None,
            next_run: Some(start),
            trigger,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.trigger.is_recurring()
    }

    /// Requested start time.
    pub fn scheduled_time(&self) -> DateTime<Utc> {
        self.trigger.start()
    }
}

/// Cache entry: the fast-path shadow of a job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedStatus {
    pub status: JobStatus,
    pub next_run: Option<DateTime<Utc>>,
}

impl From<&Job> for CachedStatus {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            next_run: job.next_run,
        }
    }
}

/// Partial update applied to a job's Store row and Cache entry together.
///
/// `last_run` / `next_run` are `None` to leave the field unchanged,
/// `Some(None)` to clear it and `Some(Some(t))` to set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub last_run: Option<Option<DateTime<Utc>>>,
    pub next_run: Option<Option<DateTime<Utc>>>,
}

impl StatusUpdate {
    /// Status-only update.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            last_run: None,
            next_run: None,
        }
    }

    pub fn with_last_run(mut self, at: DateTime<Utc>) -> Self {
        self.last_run = Some(Some(at));
        self
    }

    pub fn with_next_run(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.next_run = Some(next);
        self
    }

    /// Merge into a cache entry, honouring "unchanged" fields.
    pub fn apply_to(&self, cached: &mut CachedStatus) {
        cached.status = self.status;
        if let Some(next) = self.next_run {
            cached.next_run = next;
        }
    }
}

/// Answer to a status query. `status` is `None` for an unknown job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub job_id: String,
    pub status: Option<JobStatus>,
    pub next_run: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn unknown(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: None,
            next_run: None,
        }
    }

    /// Status as shown to clients: the lowercase status name or `"unknown"`.
    pub fn status_label(&self) -> String {
        self.status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    #[test]
    fn job_id_is_deterministic_per_second() {
        let a = job_id_for("ping", t0());
        let b = job_id_for("ping", t0() + chrono::Duration::milliseconds(400));
        assert_eq!(a, b);
        assert_eq!(a, format!("ping_{}", t0().timestamp()));
        assert_ne!(a, job_id_for("ping", t0() + chrono::Duration::seconds(1)));
    }

    #[test]
    fn recurrence_keywords() {
        assert_eq!(Recurrence::parse("none").expect("none"), None);
        assert_eq!(Recurrence::parse("").expect("empty"), None);
        assert_eq!(Recurrence::parse("Daily").expect("daily"), Some(Recurrence::Daily));
        assert_eq!(Recurrence::Weekly.every_secs(), 7 * 24 * 3600);
        assert!(matches!(
            Recurrence::parse("monthly"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn non_positive_interval_is_invalid() {
        let zero = TriggerSpec::Interval { every_secs: 0, start: t0() };
        let negative = TriggerSpec::Interval { every_secs: -60, start: t0() };
        assert!(zero.validate().is_err());
        assert!(negative.validate().is_err());
        assert!(TriggerSpec::OneShot { at: t0() }.validate().is_ok());
    }

    #[test]
    fn out_of_range_interval_is_invalid() {
        let huge = TriggerSpec::Interval { every_secs: 1_000_000_000_000_000, start: t0() };
        let max = TriggerSpec::Interval { every_secs: i64::MAX, start: t0() };
        assert!(matches!(huge.validate(), Err(SchedulerError::InvalidSchedule(_))));
        assert!(matches!(max.validate(), Err(SchedulerError::InvalidSchedule(_))));

        let weekly = TriggerSpec::Interval { every_secs: 604_800, start: t0() };
        assert!(weekly.validate().is_ok());
    }

    #[test]
    fn new_job_starts_pending_at_start_time() {
        let trigger = TriggerSpec::from_recurrence(t0(), Some(Recurrence::Hourly));
        let job = Job::new("cleanup", "rm -f /tmp/x", trigger, t0());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.next_run, Some(t0()));
        assert!(job.last_run.is_none());
        assert!(job.is_recurring());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Recurring,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("missed".parse::<JobStatus>().is_err());
    }

    #[test]
    fn update_leaves_unspecified_fields_alone() {
        let mut cached = CachedStatus {
            status: JobStatus::Pending,
            next_run: Some(t0()),
        };
        StatusUpdate::status(JobStatus::Running).apply_to(&mut cached);
        assert_eq!(cached.next_run, Some(t0()));

        StatusUpdate::status(JobStatus::Failed)
            .with_next_run(None)
            .apply_to(&mut cached);
        assert_eq!(cached.status, JobStatus::Failed);
        assert_eq!(cached.next_run, None);
    }

    #[test]
    fn unknown_report_label() {
        assert_eq!(StatusReport::unknown("x_1").status_label(), "unknown");
    }
}
