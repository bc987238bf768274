//! Result shape returned to the scheduler.

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    Error,
}

/// Outcome of a single command run.
///
/// On success `output` holds trimmed stdout and `error` is empty; on failure
/// `output` is empty and `error` explains what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub status: ExecStatus,
    pub output: String,
    pub error: String,
}

impl ExecOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::Success,
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::Error,
            output: String::new(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

impl From<ExecError> for ExecOutcome {
    fn from(e: ExecError) -> Self {
        Self::error(e.to_string())
    }
}
