//! Azure resources, driven through the `az` CLI
//!
//! Everything cloudbench creates on Azure lives in one resource group per
//! run; deleting the group is the backstop that removes whatever the
//! individual deletes missed.

mod postgres;
mod resource_group;
mod vm;

pub use postgres::{AzurePostgresServer, SUPPORTED_POSTGRES_VERSIONS};
pub use resource_group::AzureResourceGroup;
pub use vm::AzureVirtualMachine;

use crate::config::BenchmarkSpec;
use crate::error::{ConfigError, Operation, ResourceError};
use crate::provider::{classify_cli_error, tags};
use crate::resource::Resource;
use cloudbench_common::{CommandExecutor, CommandOutput, ExecOptions, RunUri};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Azure CLI binary
pub const AZURE_PATH: &str = "az";

/// Thin wrapper around the executor that speaks `az`
#[derive(Clone)]
pub struct AzureCli {
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for AzureCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AzureCli")
    }
}

impl AzureCli {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run a command, returning its output whatever the exit code
    pub async fn output(
        &self,
        resource: &str,
        operation: Operation,
        argv: &[String],
        options: &ExecOptions,
    ) -> Result<CommandOutput, ResourceError> {
        self.executor
            .execute(argv, options)
            .await
            .map_err(|source| ResourceError::Execution {
                resource: resource.to_string(),
                operation,
                source,
            })
    }

    /// Run a command that must succeed; non-zero exits are classified
    pub async fn run(
        &self,
        resource: &str,
        operation: Operation,
        argv: &[String],
        options: &ExecOptions,
    ) -> Result<CommandOutput, ResourceError> {
        let output = self.output(resource, operation, argv, options).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ResourceError::Rejected {
                resource: resource.to_string(),
                operation,
                source: classify_cli_error(&output.stderr),
            })
        }
    }

    /// Run a `show`-style command and parse its JSON
    ///
    /// Returns `None` when the provider says the resource does not exist.
    pub async fn show(
        &self,
        resource: &str,
        operation: Operation,
        argv: &[String],
    ) -> Result<Option<Value>, ResourceError> {
        match self
            .run(resource, operation, argv, &ExecOptions::for_probe())
            .await
        {
            Ok(output) => parse_json(resource, operation, &output.stdout).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run a `show`-style command for its exit status alone
    ///
    /// `Ok(false)` only when the provider says the resource does not exist;
    /// any other failure (auth, throttling, a CLI crash) is an error.
    pub async fn exists(
        &self,
        resource: &str,
        operation: Operation,
        argv: &[String],
    ) -> Result<bool, ResourceError> {
        match self
            .run(resource, operation, argv, &ExecOptions::for_probe())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Build the Azure resources of a run: the resource group, one VM per
/// requested instance, and the database server
pub fn build_resources(
    spec: &BenchmarkSpec,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Vec<Box<dyn Resource>>, ConfigError> {
    let cli = AzureCli::new(executor);
    let location = spec
        .primary_zone()
        .ok_or_else(|| ConfigError::MissingSection {
            benchmark: spec.name.clone(),
            section: "vm_groups".to_string(),
        })?;

    let group = AzureResourceGroup::new(cli.clone(), &spec.run_uri, location);
    let resource_group = group.name().to_string();
    let mut resources: Vec<Box<dyn Resource>> = vec![Box::new(group)];

    for (group_name, group_spec) in &spec.vm_groups {
        for index in 0..group_spec.vm_count {
            resources.push(Box::new(AzureVirtualMachine::new(
                cli.clone(),
                &spec.run_uri,
                &resource_group,
                group_name,
                index,
                group_spec,
            )));
        }
    }

    if let Some(database) = &spec.database {
        resources.push(Box::new(AzurePostgresServer::new(
            cli,
            &spec.run_uri,
            &resource_group,
            database,
        )?));
    }
    Ok(resources)
}

/// Build an `az` argv
pub fn az<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(AZURE_PATH.to_string())
        .chain(parts.into_iter().map(Into::into))
        .collect()
}

/// `--resource-group <name>`
pub fn resource_group_args(resource_group: &str) -> Vec<String> {
    vec!["--resource-group".to_string(), resource_group.to_string()]
}

/// `--tags k=v ...` with the standard cloudbench tags
pub fn tag_args(run_uri: &RunUri) -> Vec<String> {
    std::iter::once("--tags".to_string())
        .chain(tags::standard_tags(run_uri))
        .collect()
}

/// Parse CLI stdout as JSON
pub fn parse_json(
    resource: &str,
    operation: Operation,
    stdout: &str,
) -> Result<Value, ResourceError> {
    serde_json::from_str(stdout).map_err(|e| ResourceError::MalformedResponse {
        resource: resource.to_string(),
        operation,
        reason: format!("invalid JSON: {e}"),
    })
}

/// Read a string field out of a CLI JSON document
pub fn str_field<'a>(
    value: &'a Value,
    field: &str,
    resource: &str,
    operation: Operation,
) -> Result<&'a str, ResourceError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ResourceError::MalformedResponse {
            resource: resource.to_string(),
            operation,
            reason: format!("missing string field '{field}'"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudbench_test_utils::FakeExecutor;
    use serde_json::json;

    #[test]
    fn test_az_argv() {
        let argv = az(["group", "show"]);
        assert_eq!(argv, vec!["az", "group", "show"]);
        assert_eq!(resource_group_args("rg"), vec!["--resource-group", "rg"]);
    }

    #[test]
    fn test_tag_args() {
        let args = tag_args(&RunUri::parse("abc").unwrap());
        assert_eq!(args[0], "--tags");
        assert!(args.contains(&"cloudbench-run-uri=abc".to_string()));
    }

    #[test]
    fn test_str_field() {
        let doc = json!({"userVisibleState": "Ready", "n": 1});
        assert_eq!(
            str_field(&doc, "userVisibleState", "db", Operation::Probe).unwrap(),
            "Ready"
        );
        let err = str_field(&doc, "n", "db", Operation::Probe).unwrap_err();
        assert!(matches!(err, ResourceError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_show_maps_not_found_to_none() {
        let fake = Arc::new(FakeExecutor::new());
        fake.respond(
            &["az", "group", "show"],
            CommandOutput::failure(3, "ERROR: (ResourceGroupNotFound) gone"),
        );
        let cli = AzureCli::new(fake.clone());
        let shown = cli
            .show("rg", Operation::Probe, &az(["group", "show"]))
            .await
            .unwrap();
        assert!(shown.is_none());
        assert!(fake.calls()[0].suppress_warning);
    }

    #[tokio::test]
    async fn test_run_classifies_failures() {
        let fake = Arc::new(FakeExecutor::new());
        fake.respond(
            &["az", "group", "delete"],
            CommandOutput::failure(1, "ERROR: (TooManyRequests) slow down"),
        );
        let cli = AzureCli::new(fake);
        let err = cli
            .run(
                "rg",
                Operation::Delete,
                &az(["group", "delete"]),
                &ExecOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_executor_failure_is_execution_error() {
        let fake = Arc::new(FakeExecutor::new());
        fake.fail_to_spawn(&["az"], "az: not found");
        let cli = AzureCli::new(fake);
        let err = cli
            .exists("rg", Operation::Exists, &az(["group", "exists"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_exists_only_not_found_is_absent() {
        let fake = Arc::new(FakeExecutor::new());
        let cli = AzureCli::new(fake.clone());
        let argv = az(["vm", "show"]);

        assert!(cli.exists("vm", Operation::Exists, &argv).await.unwrap());

        fake.respond(
            &["az", "vm", "show"],
            CommandOutput::failure(3, "ERROR: (ResourceNotFound) gone"),
        );
        assert!(!cli.exists("vm", Operation::Exists, &argv).await.unwrap());

        fake.respond(
            &["az", "vm", "show"],
            CommandOutput::failure(1, "ERROR: (AuthorizationFailed) no access"),
        );
        let err = cli.exists("vm", Operation::Exists, &argv).await.unwrap_err();
        assert!(matches!(err, ResourceError::Rejected { .. }));
        assert!(!err.is_not_found());

        fake.respond(
            &["az", "vm", "show"],
            CommandOutput::failure(1, "ERROR: (TooManyRequests) slow down"),
        );
        let err = cli.exists("vm", Operation::Exists, &argv).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
