//! External command executor contract
//!
//! Every provider interaction goes through a [`CommandExecutor`]. The
//! coordinator ships a process-backed implementation; tests script one.

use crate::defaults::{
    DEFAULT_COMMAND_TIMEOUT_SECS, PROBE_COMMAND_TIMEOUT_SECS, PROVISIONING_COMMAND_TIMEOUT_SECS,
};
use async_trait::async_trait;
use std::time::Duration;

/// Captured result of one external command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Output of a command that exited 0
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Output of a command that exited non-zero
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Options for a single command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Kill the command if it runs longer than this
    pub timeout: Duration,
    /// Log non-zero exits at debug instead of warn (expected failures)
    pub suppress_warning: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            suppress_warning: false,
        }
    }
}

impl ExecOptions {
    /// Status/existence probes: short timeout, non-zero exit is expected
    pub fn for_probe() -> Self {
        Self {
            timeout: Duration::from_secs(PROBE_COMMAND_TIMEOUT_SECS),
            suppress_warning: true,
        }
    }

    /// Provider commands that block until the resource is provisioned
    pub fn for_provisioning() -> Self {
        Self {
            timeout: Duration::from_secs(PROVISIONING_COMMAND_TIMEOUT_SECS),
            suppress_warning: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs an external command and captures its output.
///
/// Implementations return `Err` only when the command could not be run to
/// completion (spawn failure, timeout). A non-zero exit is a normal
/// [`CommandOutput`] and interpreting it is the caller's business.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, argv: &[String], options: &ExecOptions) -> anyhow::Result<CommandOutput>;
}
