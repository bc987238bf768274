//! `ShellExecutor`: runs a command through the platform shell and waits.

use std::process::{Command, Output};
use std::time::Instant;

use tracing::{error, info};

use crate::{
    error::{ExecError, Result},
    types::ExecOutcome,
    CommandExecutor,
};

/// Runs commands via `sh -c` (or `cmd /C` on Windows).
///
/// Uses `std::process::Command`, so each call blocks the current thread
/// until the child exits. There is no timeout or kill path.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    flag: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }

    /// Use a specific shell binary and its "run this string" flag.
    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }

    /// Run `command` and return trimmed stdout, or the reason it failed.
    pub fn run(&self, command: &str) -> Result<String> {
        let command = validate_command(command)?;
        let output = Command::new(&self.shell)
            .arg(&self.flag)
            .arg(command)
            .output()?;
        interpret(output)
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, task_name: &str, command: &str) -> ExecOutcome {
        info!(task = %task_name, %command, "executing task");
        let started = Instant::now();

        match self.run(command) {
            Ok(stdout) => {
                info!(
                    task = %task_name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "task executed successfully"
                );
                ExecOutcome::success(stdout)
            }
            Err(e) => {
                error!(task = %task_name, error = %e, "task failed");
                e.into()
            }
        }
    }
}

fn validate_command(command: &str) -> Result<&str> {
    if command.trim().is_empty() {
        return Err(ExecError::EmptyCommand);
    }
    Ok(command)
}

fn interpret(output: Output) -> Result<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Err(ExecError::Failed(format!("command exited with {}", output.status)))
    } else {
        Err(ExecError::Failed(stderr))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::ExecStatus;

    #[test]
    fn successful_command_captures_stdout() {
        let outcome = ShellExecutor::new().execute("echo", "echo hello");
        assert_eq!(outcome.status, ExecStatus::Success);
        assert_eq!(outcome.output, "hello");
        assert!(outcome.error.is_empty());
    }

    #[test]
    fn non_zero_exit_reports_stderr() {
        let outcome = ShellExecutor::new().execute("fail", "echo broken >&2; exit 3");
        assert_eq!(outcome.status, ExecStatus::Error);
        assert_eq!(outcome.error, "broken");
        assert!(outcome.output.is_empty());
    }

    #[test]
    fn silent_failure_reports_exit_status() {
        let outcome = ShellExecutor::new().execute("false", "exit 7");
        assert!(!outcome.is_success());
        assert!(outcome.error.contains("exited with"), "got: {}", outcome.error);
    }

    #[test]
    fn empty_command_is_rejected_without_spawning() {
        let outcome = ShellExecutor::new().execute("blank", "   ");
        assert!(!outcome.is_success());
        assert!(outcome.error.contains("non-empty"));
    }

    #[test]
    fn missing_shell_is_an_error_outcome() {
        let exec = ShellExecutor::with_shell("/no/such/shell", "-c");
        let outcome = exec.execute("ghost", "true");
        assert!(!outcome.is_success());
        assert!(outcome.error.starts_with("Spawn error"));
    }

    #[test]
    fn outcome_serializes_lowercase_status() {
        let json = serde_json::to_string(&ExecOutcome::success("ok")).expect("json");
        assert!(json.contains(r#""status":"success""#));
    }
}
