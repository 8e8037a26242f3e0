//! External command execution with captured output and a time budget.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

use crate::error::{ComposeError, Result};

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (`None` if killed by a signal).
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Runs one program with different argument lists.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Program to execute.
    program: String,
    /// Default time budget per command.
    timeout: Duration,
}

impl CommandOutput {
    /// Returns true if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl CommandRunner {
    /// Creates a runner for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Renders a command line for logs and errors.
    #[must_use]
    pub fn render(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command with the default time budget.
    ///
    /// A non-zero exit is not an error here; see [`Self::run_checked`].
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or times out.
    pub async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        self.run_with_timeout(args, self.timeout).await
    }

    /// Runs the command with an explicit time budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or times out.
    pub async fn run_with_timeout(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let rendered = self.render(args);
        trace!("Running: {rendered}");

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ComposeError::CommandFailed {
                command: rendered.clone(),
                code: None,
                stderr: format!("failed to spawn: {e}"),
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ComposeError::Timeout {
                command: rendered.clone(),
                secs: timeout.as_secs(),
            })?
            .map_err(|e| ComposeError::CommandFailed {
                command: rendered,
                code: None,
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs the command and turns a non-zero exit into an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails to run or exits non-zero.
    pub async fn run_checked(&self, args: &[String]) -> Result<CommandOutput> {
        let output = self.run(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ComposeError::CommandFailed {
                command: self.render(args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HomestackError;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = CommandRunner::new("echo", Duration::from_secs(10));
        let output = runner.run(&args(&["hello"])).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_checked_fails_on_nonzero_exit() {
        let runner = CommandRunner::new("false", Duration::from_secs(10));
        let result = runner.run_checked(&[]).await;
        assert!(matches!(
            result,
            Err(HomestackError::Compose(ComposeError::CommandFailed { code: Some(1), .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_command_failure() {
        let runner = CommandRunner::new("homestack-no-such-binary", Duration::from_secs(10));
        let result = runner.run(&[]).await;
        assert!(matches!(
            result,
            Err(HomestackError::Compose(ComposeError::CommandFailed { code: None, .. }))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = CommandRunner::new("sleep", Duration::from_millis(50));
        let result = runner.run(&args(&["5"])).await;
        assert!(matches!(
            result,
            Err(HomestackError::Compose(ComposeError::Timeout { .. }))
        ));
    }

    #[test]
    fn test_render() {
        let runner = CommandRunner::new("docker", Duration::from_secs(1));
        assert_eq!(runner.render(&args(&["compose", "ps"])), "docker compose ps");
    }
}
