use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent). Rows are never deleted by the
/// scheduler; they are the historical record of every scheduled job.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            job_id          TEXT    NOT NULL PRIMARY KEY,
            task_name       TEXT    NOT NULL,
            command         TEXT    NOT NULL,
            trigger_spec    TEXT    NOT NULL,   -- JSON-encoded TriggerSpec
            scheduled_time  TEXT    NOT NULL,   -- ISO-8601 UTC
            is_recurring    INTEGER NOT NULL,
            status          TEXT    NOT NULL DEFAULT 'pending',
            last_run        TEXT,               -- ISO-8601 UTC or NULL
            next_run        TEXT,               -- ISO-8601 UTC or NULL
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs (created_at);
        ",
    )?;
    Ok(())
}
