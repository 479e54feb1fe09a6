//! Process-backed command executor
//!
//! Runs provider CLIs (`az`, `ssh`) as child processes and captures their
//! output for the resources to interpret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use cloudbench_common::{CommandExecutor, CommandOutput, ExecOptions};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executes commands as local child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, argv: &[String], options: &ExecOptions) -> Result<CommandOutput> {
        let (program, args) = argv.split_first().context("Cannot execute an empty command")?;

        debug!(
            cmd = %program,
            args = ?args,
            timeout_secs = options.timeout.as_secs(),
            "Running command"
        );

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", program))?;

        // Dropping the wait future on timeout kills the child (kill_on_drop)
        let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("Failed waiting for command")?,
            Err(_) => {
                warn!(
                    cmd = %program,
                    timeout_secs = options.timeout.as_secs(),
                    "Command timed out, killing process"
                );
                anyhow::bail!(
                    "Command '{}' timed out after {}s",
                    program,
                    options.timeout.as_secs()
                );
            }
        };

        // Killed by a signal: no exit code, report as -1
        let exit_code = output.status.code().unwrap_or(-1);
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        };

        if !result.is_success() {
            if options.suppress_warning {
                debug!(cmd = %program, exit_code, "Command exited non-zero");
            } else {
                warn!(
                    cmd = %program,
                    args = ?args,
                    exit_code,
                    stderr = %result.stderr.trim(),
                    "Command failed"
                );
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
        parts.into_iter().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let output = ProcessExecutor::new()
            .execute(&argv(["echo", "hello"]), &ExecOptions::default())
            .await
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let output = ProcessExecutor::new()
            .execute(&argv(["false"]), &ExecOptions::for_probe())
            .await
            .unwrap();
        assert!(!output.is_success());
        assert_eq!(output.exit_code, 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let result = ProcessExecutor::new()
            .execute(
                &argv(["this-command-does-not-exist-12345"]),
                &ExecOptions::default(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let options = ExecOptions::default().with_timeout(Duration::from_millis(100));
        let err = ProcessExecutor::new()
            .execute(&argv(["sleep", "5"]), &options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let result = ProcessExecutor::new().execute(&[], &ExecOptions::default()).await;
        assert!(result.is_err());
    }
}
