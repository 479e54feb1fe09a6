//! Azure resource group holding every other resource of a run

use super::{AzureCli, az, str_field, tag_args};
use crate::error::{Operation, ResourceError};
use crate::resource::{Readiness, Resource, StatusReport};
use async_trait::async_trait;
use cloudbench_common::{ExecOptions, ResourceKind, RunUri};
use tracing::{debug, info};

#[derive(Debug)]
pub struct AzureResourceGroup {
    cli: AzureCli,
    name: String,
    location: String,
    run_uri: RunUri,
}

impl AzureResourceGroup {
    pub fn new(cli: AzureCli, run_uri: &RunUri, location: impl Into<String>) -> Self {
        Self {
            cli,
            name: Self::name_for(run_uri),
            location: location.into(),
            run_uri: run_uri.clone(),
        }
    }

    /// Resource group name for a run
    pub fn name_for(run_uri: &RunUri) -> String {
        format!("cloudbench-{run_uri}-rg")
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

#[async_trait]
impl Resource for AzureResourceGroup {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&mut self) -> Result<(), ResourceError> {
        let mut argv = az([
            "group",
            "create",
            "--name",
            self.name.as_str(),
            "--location",
            self.location.as_str(),
        ]);
        argv.extend(tag_args(&self.run_uri));

        info!(resource = %self.name, location = %self.location, "Creating resource group");
        self.cli
            .run(&self.name, Operation::Create, &argv, &ExecOptions::default())
            .await?;
        Ok(())
    }

    async fn exists(&self) -> Result<bool, ResourceError> {
        let argv = az(["group", "exists", "--name", self.name.as_str()]);
        let output = self
            .cli
            .run(&self.name, Operation::Exists, &argv, &ExecOptions::for_probe())
            .await?;
        match output.stdout.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ResourceError::MalformedResponse {
                resource: self.name.clone(),
                operation: Operation::Exists,
                reason: format!("expected true or false, got {other:?}"),
            }),
        }
    }

    async fn probe(&self) -> Result<Readiness, ResourceError> {
        let argv = az(["group", "show", "--name", self.name.as_str()]);
        let Some(doc) = self.cli.show(&self.name, Operation::Probe, &argv).await? else {
            return Ok(Readiness::NotReady(StatusReport::new("NotFound")));
        };

        let properties = doc.get("properties").unwrap_or(&doc);
        let state = str_field(properties, "provisioningState", &self.name, Operation::Probe)?;
        debug!(resource = %self.name, state, "Resource group state");

        let report = StatusReport::new(state);
        if state == "Succeeded" {
            Ok(Readiness::Ready(report))
        } else {
            Ok(Readiness::NotReady(report))
        }
    }

    async fn delete(&self) -> Result<(), ResourceError> {
        let argv = az(["group", "delete", "--name", self.name.as_str(), "--yes"]);
        info!(resource = %self.name, "Deleting resource group");
        self.cli
            .run(
                &self.name,
                Operation::Delete,
                &argv,
                &ExecOptions::for_provisioning(),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudbench_common::CommandOutput;
    use cloudbench_test_utils::{FakeExecutor, TEST_RUN_URI};
    use std::sync::Arc;

    fn group(fake: &Arc<FakeExecutor>) -> AzureResourceGroup {
        AzureResourceGroup::new(
            AzureCli::new(fake.clone()),
            &RunUri::parse(TEST_RUN_URI).unwrap(),
            "eastus",
        )
    }

    #[tokio::test]
    async fn test_create_is_tagged() {
        let fake = Arc::new(FakeExecutor::new());
        let mut rg = group(&fake);
        rg.create().await.unwrap();

        let call = &fake.calls_matching(&["az", "group", "create"])[0];
        assert_eq!(call.flag_value("--name"), Some("cloudbench-test1234-rg"));
        assert_eq!(call.flag_value("--location"), Some("eastus"));
        assert!(
            call.argv
                .contains(&format!("cloudbench-run-uri={TEST_RUN_URI}"))
        );
    }

    #[tokio::test]
    async fn test_exists_parses_boolean() {
        let fake = Arc::new(FakeExecutor::new());
        let rg = group(&fake);

        fake.respond(&["az", "group", "exists"], CommandOutput::success("true\n"));
        assert!(rg.exists().await.unwrap());

        fake.respond(&["az", "group", "exists"], CommandOutput::success("false\n"));
        assert!(!rg.exists().await.unwrap());

        fake.respond(&["az", "group", "exists"], CommandOutput::success("maybe"));
        assert!(rg.exists().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_reads_provisioning_state() {
        let fake = Arc::new(FakeExecutor::new());
        let rg = group(&fake);

        fake.respond(
            &["az", "group", "show"],
            CommandOutput::success(r#"{"properties": {"provisioningState": "Succeeded"}}"#),
        );
        assert!(rg.probe().await.unwrap().is_ready());

        fake.respond(
            &["az", "group", "show"],
            CommandOutput::failure(3, "ERROR: (ResourceGroupNotFound) missing"),
        );
        let readiness = rg.probe().await.unwrap();
        assert_eq!(readiness.report().state, "NotFound");
    }
}
