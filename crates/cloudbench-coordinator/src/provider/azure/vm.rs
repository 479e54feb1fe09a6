//! Azure virtual machine running the workload client

use super::{AzureCli, az, resource_group_args, str_field, tag_args};
use crate::error::{Operation, ResourceError};
use crate::provider::ProviderError;
use crate::resource::{Endpoint, HostEndpoint, Readiness, Resource, StatusReport};
use async_trait::async_trait;
use cloudbench_common::defaults::DEFAULT_VM_USER;
use cloudbench_common::{ExecOptions, MachineType, ResourceKind, RunUri, VmGroupSpec};
use tracing::{debug, info};

/// Image used when the spec names none
pub const DEFAULT_IMAGE: &str = "Ubuntu2204";

const RUNNING: &str = "VM running";

#[derive(Debug)]
pub struct AzureVirtualMachine {
    cli: AzureCli,
    name: String,
    resource_group: String,
    location: String,
    size: String,
    image: String,
    admin_user: String,
    os_disk_size_gb: Option<u32>,
    storage_sku: Option<String>,
    run_uri: RunUri,
}

impl AzureVirtualMachine {
    /// VM `index` of vm group `group`
    pub fn new(
        cli: AzureCli,
        run_uri: &RunUri,
        resource_group: &str,
        group: &str,
        index: u32,
        spec: &VmGroupSpec,
    ) -> Self {
        Self {
            cli,
            name: format!("cloudbench-{run_uri}-{group}-{index}"),
            resource_group: resource_group.to_string(),
            location: spec.vm.zone.clone(),
            size: azure_size(&spec.vm.machine_type),
            image: spec
                .vm
                .image
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            admin_user: DEFAULT_VM_USER.to_string(),
            os_disk_size_gb: spec.disk.as_ref().map(|d| d.disk_size),
            storage_sku: spec.disk.as_ref().and_then(|d| d.disk_type.clone()),
            run_uri: run_uri.clone(),
        }
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    fn target_args(&self) -> Vec<String> {
        let mut args = vec!["--name".to_string(), self.name.clone()];
        args.extend(resource_group_args(&self.resource_group));
        args
    }
}

/// Map a machine sizing onto an Azure VM size
///
/// Custom CPU counts map onto the general purpose D-series.
fn azure_size(machine_type: &MachineType) -> String {
    match machine_type {
        MachineType::Named(name) => name.clone(),
        MachineType::Custom { cpus, .. } => format!("Standard_D{cpus}s_v3"),
    }
}

#[async_trait]
impl Resource for AzureVirtualMachine {
    fn kind(&self) -> ResourceKind {
        ResourceKind::VirtualMachine
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&mut self) -> Result<(), ResourceError> {
        let mut argv = az(["vm", "create"]);
        argv.extend(self.target_args());
        argv.extend([
            "--location".to_string(),
            self.location.clone(),
            "--size".to_string(),
            self.size.clone(),
            "--image".to_string(),
            self.image.clone(),
            "--admin-username".to_string(),
            self.admin_user.clone(),
            "--generate-ssh-keys".to_string(),
            "--public-ip-sku".to_string(),
            "Standard".to_string(),
        ]);
        if let Some(size) = self.os_disk_size_gb {
            argv.extend(["--os-disk-size-gb".to_string(), size.to_string()]);
        }
        if let Some(sku) = &self.storage_sku {
            argv.extend(["--storage-sku".to_string(), sku.clone()]);
        }
        argv.extend(tag_args(&self.run_uri));
        argv.push("--no-wait".to_string());

        info!(resource = %self.name, size = %self.size, "Creating virtual machine");
        self.cli
            .run(&self.name, Operation::Create, &argv, &ExecOptions::default())
            .await?;
        Ok(())
    }

    async fn exists(&self) -> Result<bool, ResourceError> {
        let mut argv = az(["vm", "show"]);
        argv.extend(self.target_args());
        self.cli.exists(&self.name, Operation::Exists, &argv).await
    }

    async fn probe(&self) -> Result<Readiness, ResourceError> {
        let mut argv = az(["vm", "show", "-d"]);
        argv.extend(self.target_args());

        // `--no-wait` returns before the VM is visible
        let Some(doc) = self.cli.show(&self.name, Operation::Probe, &argv).await? else {
            return Ok(Readiness::NotReady(StatusReport::new("NotFound")));
        };

        let provisioning = str_field(&doc, "provisioningState", &self.name, Operation::Probe)?;
        if provisioning == "Failed" {
            return Err(ResourceError::Rejected {
                resource: self.name.clone(),
                operation: Operation::Probe,
                source: ProviderError::Cli {
                    code: Some("ProvisioningFailed".into()),
                    message: "provisioningState is Failed".into(),
                },
            });
        }

        let power = doc.get("powerState").and_then(|v| v.as_str()).unwrap_or("");
        let public_ip = doc
            .get("publicIps")
            .and_then(|v| v.as_str())
            .filter(|ip| !ip.is_empty());
        debug!(resource = %self.name, provisioning, power, "Virtual machine state");

        let mut report = StatusReport::new(if power.is_empty() { provisioning } else { power });
        if let Some(ip) = public_ip {
            report = report.with_endpoint(ip);
        }

        if provisioning == "Succeeded" && power == RUNNING {
            Ok(Readiness::Ready(report))
        } else {
            Ok(Readiness::NotReady(report))
        }
    }

    async fn post_create(
        &mut self,
        status: &StatusReport,
    ) -> Result<Option<Endpoint>, ResourceError> {
        let address = status
            .endpoint
            .clone()
            .ok_or_else(|| ResourceError::MalformedResponse {
                resource: self.name.clone(),
                operation: Operation::PostCreate,
                reason: "running VM has no public IP".into(),
            })?;
        Ok(Some(Endpoint::Host(HostEndpoint {
            address,
            user: self.admin_user.clone(),
        })))
    }

    async fn delete(&self) -> Result<(), ResourceError> {
        let mut argv = az(["vm", "delete"]);
        argv.extend(self.target_args());
        argv.push("--yes".to_string());

        info!(resource = %self.name, "Deleting virtual machine");
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
