//! cadence-executor: runs catalog commands on the host shell.
//!
//! Execution is synchronous and has no timeout: the calling thread is
//! occupied until the child exits. Callers that must stay responsive run
//! [`CommandExecutor::execute`] on a dedicated worker.
//!
//! ```rust,no_run
//! use cadence_executor::{CommandExecutor, ShellExecutor};
//!
//! let outcome = ShellExecutor::new().execute("uptime", "uptime");
//! println!("{:?}: {}", outcome.status, outcome.output);
//! ```

pub mod error;
pub mod shell;
pub mod types;

pub use error::{ExecError, Result};
pub use shell::ShellExecutor;
pub use types::{ExecOutcome, ExecStatus};

/// Contract of the command runner invoked on every fire.
///
/// Implementations never panic on command failure; every failure mode is
/// folded into an [`ExecOutcome`] with [`ExecStatus::Error`].
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, task_name: &str, command: &str) -> ExecOutcome;
}
