use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The provided trigger definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// A row with this ID already exists.
    #[error("Duplicate job: {id}")]
    DuplicateJob { id: String },

    /// Engine settings that cannot drive the background loops.
    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),

    /// A stored row could not be decoded.
    #[error("Corrupt record for job {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
