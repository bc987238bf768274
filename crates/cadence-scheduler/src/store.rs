use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    time::{parse_iso, to_db_time},
    types::{Job, JobStatus, StatusUpdate, TriggerSpec},
};

const SELECT_COLUMNS: &str = "SELECT job_id, task_name, command, trigger_spec, status,
        last_run, next_run, created_at, updated_at
     FROM jobs";

/// Durable job record backed by SQLite.
///
/// Wraps a single connection in a `Mutex`; every operation is a short
/// statement, so contention stays low even with the reconciler and the
/// worker pool writing concurrently.
pub struct StatusStore {
    conn: Mutex<Connection>,
}

impl StatusStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new row. Fails with `DuplicateJob` if the id is taken.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub fn create(&self, job: &Job) -> Result<()> {
        let trigger_json = encode_trigger(job)?;
        let conn = self.conn.lock().expect("store connection poisoned");
        let inserted = conn.execute(
            "INSERT INTO jobs
             (job_id, task_name, command, trigger_spec, scheduled_time, is_recurring,
              status, last_run, next_run, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                job.job_id,
                job.task_name,
                job.command,
                trigger_json,
                to_db_time(job.scheduled_time()),
                job.is_recurring(),
                job.status.to_string(),
                job.last_run.map(to_db_time),
                job.next_run.map(to_db_time),
                to_db_time(job.created_at),
                to_db_time(job.updated_at),
            ],
        );
        match inserted {
            Ok(_) => {
                info!(task = %job.task_name, "job row created");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(SchedulerError::DuplicateJob {
                    id: job.job_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite every column of an existing row except `created_at`.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub fn replace(&self, job: &Job) -> Result<()> {
        let trigger_json = encode_trigger(job)?;
        let conn = self.conn.lock().expect("store connection poisoned");
        let n = conn.execute(
            "UPDATE jobs SET task_name=?1, command=?2, trigger_spec=?3, scheduled_time=?4,
                 is_recurring=?5, status=?6, last_run=?7, next_run=?8, updated_at=?9
             WHERE job_id=?10",
            rusqlite::params![
                job.task_name,
                job.command,
                trigger_json,
                to_db_time(job.scheduled_time()),
                job.is_recurring(),
                job.status.to_string(),
                job.last_run.map(to_db_time),
                job.next_run.map(to_db_time),
                to_db_time(job.updated_at),
                job.job_id,
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound {
                id: job.job_id.clone(),
            });
        }
        info!(task = %job.task_name, "job row replaced");
        Ok(())
    }

    /// Apply a partial update. Fields the update leaves unset keep their
    /// stored value.
    #[instrument(skip(self), fields(status = %update.status))]
    pub fn update(&self, job_id: &str, update: &StatusUpdate) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let n = conn.execute(
            "UPDATE jobs SET status = ?1,
                 last_run = CASE WHEN ?2 THEN ?3 ELSE last_run END,
                 next_run = CASE WHEN ?4 THEN ?5 ELSE next_run END,
                 updated_at = ?6
             WHERE job_id = ?7",
            rusqlite::params![
                update.status.to_string(),
                update.last_run.is_some(),
                update.last_run.flatten().map(to_db_time),
                update.next_run.is_some(),
                update.next_run.flatten().map(to_db_time),
                to_db_time(Utc::now()),
                job_id,
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        debug!("job row updated");
        Ok(())
    }

    /// Fetch one row, `None` if the id is unknown.
    pub fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE job_id = ?1"),
                [job_id],
                read_row,
            )
            .optional()?;
        raw.map(RawJob::decode).transpose()
    }

    /// All rows ordered by creation time. Rows that fail to decode are
    /// logged and skipped.
    pub fn list_all(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at, job_id"))?;
        let rows = stmt.query_map([], read_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            match row?.decode() {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(error = %e, "skipping undecodable job row"),
            }
        }
        Ok(jobs)
    }

    /// Ids of every row, used by reconciliation to tell owned jobs apart.
    pub fn known_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let mut stmt = conn.prepare("SELECT job_id FROM jobs")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }
}

fn encode_trigger(job: &Job) -> Result<String> {
    serde_json::to_string(&job.trigger).map_err(|e| SchedulerError::CorruptRecord {
        id: job.job_id.clone(),
        reason: e.to_string(),
    })
}

/// Row as stored, before JSON / timestamp decoding.
struct RawJob {
    job_id: String,
    task_name: String,
    command: String,
    trigger_json: String,
    status: String,
    last_run: Option<String>,
    next_run: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        job_id: row.get(0)?,
        task_name: row.get(1)?,
        command: row.get(2)?,
        trigger_json: row.get(3)?,
        status: row.get(4)?,
        last_run: row.get(5)?,
        next_run: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl RawJob {
    fn decode(self) -> Result<Job> {
        let corrupt = |reason: String| SchedulerError::CorruptRecord {
            id: self.job_id.clone(),
            reason,
        };
        let trigger: TriggerSpec =
            serde_json::from_str(&self.trigger_json).map_err(|e| corrupt(e.to_string()))?;
        let status: JobStatus = self.status.parse().map_err(corrupt)?;
        let timestamp = |raw: &str| {
            parse_iso(raw).ok_or_else(|| corrupt(format!("bad timestamp: {raw}")))
        };
        let last_run = self.last_run.as_deref().map(timestamp).transpose()?;
        let next_run = self.next_run.as_deref().map(timestamp).transpose()?;
        let created_at = timestamp(&self.created_at)?;
        let updated_at = timestamp(&self.updated_at)?;

        Ok(Job {
            job_id: self.job_id,
            task_name: self.task_name,
            command: self.command,
            trigger,
            status,
            last_run,
            next_run,
            created_at,
            updated_at,
        })
    }
}
