//! Commands on provisioned VMs over ssh

use crate::resource::HostEndpoint;
use anyhow::{Context, Result};
use cloudbench_common::{CommandExecutor, CommandOutput, ExecOptions};
use tracing::debug;

const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "BatchMode=yes",
];

/// A client VM reachable over ssh
pub struct RemoteHost<'a> {
    endpoint: &'a HostEndpoint,
    executor: &'a dyn CommandExecutor,
}

impl<'a> RemoteHost<'a> {
    pub fn new(endpoint: &'a HostEndpoint, executor: &'a dyn CommandExecutor) -> Self {
        Self { endpoint, executor }
    }

    pub fn address(&self) -> &str {
        &self.endpoint.address
    }

    /// ssh argv running `command` on the host
    pub fn ssh_argv(&self, command: &str) -> Vec<String> {
        let mut argv = vec!["ssh".to_string()];
        argv.extend(SSH_OPTIONS.iter().map(|s| s.to_string()));
        argv.push(format!("{}@{}", self.endpoint.user, self.endpoint.address));
        argv.push(command.to_string());
        argv
    }

    /// Run `command` on the host; a non-zero exit is an error
    pub async fn remote_command(&self, command: &str) -> Result<CommandOutput> {
        debug!(host = %self.endpoint.address, "Running remote command");
        let output = self
            .executor
            .execute(&self.ssh_argv(command), &ExecOptions::for_provisioning())
            .await
            .with_context(|| format!("Failed to run command on {}", self.endpoint.address))?;

        if !output.is_success() {
            anyhow::bail!(
                "Remote command on {} exited with {}: {}",
                self.endpoint.address,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    /// Install OS packages
    pub async fn install(&self, packages: &[&str]) -> Result<()> {
        let command = format!(
            "sudo apt-get update -y && sudo DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
            packages.join(" ")
        );
        self.remote_command(&command)
            .await
            .with_context(|| format!("Failed to install {}", packages.join(", ")))?;
        Ok(())
    }
}
