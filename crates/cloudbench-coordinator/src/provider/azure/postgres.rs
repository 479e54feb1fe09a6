//! Azure Database for PostgreSQL server

use super::{AzureCli, az, resource_group_args, str_field, tag_args};
use crate::error::{ConfigError, Operation, ResourceError};
use crate::resource::{DatabaseEndpoint, Endpoint, Readiness, Resource, StatusReport};
use async_trait::async_trait;
use cloudbench_common::defaults::{DEFAULT_POSTGRES_PORT, DEFAULT_POSTGRES_VERSION};
use cloudbench_common::{Cloud, DatabaseEngine, DatabaseSpec, ExecOptions, ResourceKind, RunUri};
use tracing::{debug, info};

/// Postgres versions the server API accepts
pub const SUPPORTED_POSTGRES_VERSIONS: &[&str] = &["9.5", "9.6", "10", "11"];

const PERFORMANCE_TIER: &str = "Standard";

/// Compute units when the spec names a machine type rather than a CPU count
const DEFAULT_COMPUTE_UNITS: u32 = 400;

/// One CPU without hyperthreading is 100 compute units
const COMPUTE_UNITS_PER_CPU: u32 = 100;

const READY_STATE: &str = "Ready";

/// Firewall rule admitting Azure-internal clients (the benchmark VM)
const FIREWALL_RULE_NAME: &str = "cloudbench-allow-azure";

pub struct AzurePostgresServer {
    cli: AzureCli,
    name: String,
    resource_group: String,
    location: String,
    username: String,
    password: String,
    storage_mb: u32,
    compute_units: u32,
    version: String,
    run_uri: RunUri,
}

// Manual impl keeps the admin password out of logs
impl std::fmt::Debug for AzurePostgresServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzurePostgresServer")
            .field("name", &self.name)
            .field("resource_group", &self.resource_group)
            .field("location", &self.location)
            .field("version", &self.version)
            .field("compute_units", &self.compute_units)
            .finish_non_exhaustive()
    }
}

impl AzurePostgresServer {
    /// Build the server from a resolved database spec
    ///
    /// Rejects engines, versions and options the server API cannot serve.
    pub fn new(
        cli: AzureCli,
        run_uri: &RunUri,
        resource_group: &str,
        spec: &DatabaseSpec,
    ) -> Result<Self, ConfigError> {
        let version = Self::resolve_version(spec.engine, spec.version.as_deref())?;
        if spec.high_availability {
            return Err(ConfigError::UnsupportedOption {
                option: "high_availability",
                cloud: Cloud::Azure,
            });
        }

        let compute_units = spec
            .vm
            .machine_type
            .cpus()
            .map(|cpus| cpus * COMPUTE_UNITS_PER_CPU)
            .unwrap_or(DEFAULT_COMPUTE_UNITS);

        Ok(Self {
            cli,
            name: spec.database_name.clone(),
            resource_group: resource_group.to_string(),
            location: spec.vm.zone.clone(),
            username: spec.username.clone(),
            password: spec.password.clone(),
            storage_mb: spec.disk.disk_size * 1024,
            compute_units,
            version,
            run_uri: run_uri.clone(),
        })
    }

    /// Default version for an engine, or validate a requested one
    pub fn resolve_version(
        engine: DatabaseEngine,
        requested: Option<&str>,
    ) -> Result<String, ConfigError> {
        let unsupported = || ConfigError::UnsupportedDatabase {
            engine,
            version: requested.map(str::to_string),
            cloud: Cloud::Azure,
        };

        if engine != DatabaseEngine::Postgres {
            return Err(unsupported());
        }
        match requested {
            None => Ok(DEFAULT_POSTGRES_VERSION.to_string()),
            Some(v) if SUPPORTED_POSTGRES_VERSIONS.contains(&v) => Ok(v.to_string()),
            Some(_) => Err(unsupported()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn compute_units(&self) -> u32 {
        self.compute_units
    }

    fn server_args(&self, verb: &str) -> Vec<String> {
        let mut argv = az(["postgres", "server", verb, "--name", self.name.as_str()]);
        argv.extend(resource_group_args(&self.resource_group));
        argv
    }
}

#[async_trait]
impl Resource for AzurePostgresServer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ManagedDatabase
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&mut self) -> Result<(), ResourceError> {
        let mut argv = self.server_args("create");
        argv.extend([
            "--location".to_string(),
            self.location.clone(),
            "--admin-user".to_string(),
            self.username.clone(),
            "--admin-password".to_string(),
            self.password.clone(),
            "--storage-size".to_string(),
            self.storage_mb.to_string(),
            "--performance-tier".to_string(),
            PERFORMANCE_TIER.to_string(),
            "--compute-units".to_string(),
            self.compute_units.to_string(),
            "--version".to_string(),
            self.version.clone(),
        ]);
        argv.extend(tag_args(&self.run_uri));

        info!(
            resource = %self.name,
            version = %self.version,
            compute_units = self.compute_units,
            storage_mb = self.storage_mb,
            "Creating postgres server"
        );
        self.cli
            .run(
                &self.name,
                Operation::Create,
                &argv,
                &ExecOptions::for_provisioning(),
            )
            .await?;
        Ok(())
    }

    async fn exists(&self) -> Result<bool, ResourceError> {
        let argv = self.server_args("show");
        self.cli.exists(&self.name, Operation::Exists, &argv).await
    }

    async fn probe(&self) -> Result<Readiness, ResourceError> {
        let argv = self.server_args("show");
        let Some(doc) = self.cli.show(&self.name, Operation::Probe, &argv).await? else {
            return Ok(Readiness::NotReady(StatusReport::new("NotFound")));
        };

        let state = str_field(&doc, "userVisibleState", &self.name, Operation::Probe)?;
        info!(resource = %self.name, state, "Instance state");

        if state != READY_STATE {
            return Ok(Readiness::NotReady(StatusReport::new(state)));
        }
        let host = str_field(
            &doc,
            "fullyQualifiedDomainName",
            &self.name,
            Operation::Probe,
        )?;
        Ok(Readiness::Ready(StatusReport::new(state).with_endpoint(host)))
    }

    async fn post_create(
        &mut self,
        status: &StatusReport,
    ) -> Result<Option<Endpoint>, ResourceError> {
        let host = status
            .endpoint
            .clone()
            .ok_or_else(|| ResourceError::MalformedResponse {
                resource: self.name.clone(),
                operation: Operation::PostCreate,
                reason: "ready server reported no domain name".into(),
            })?;

        let mut argv = az([
            "postgres",
            "server",
            "firewall-rule",
            "create",
            "--server-name",
            self.name.as_str(),
            "--name",
            FIREWALL_RULE_NAME,
            "--start-ip-address",
            "0.0.0.0",
            "--end-ip-address",
            "0.0.0.0",
        ]);
        argv.extend(resource_group_args(&self.resource_group));
        self.cli
            .run(&self.name, Operation::PostCreate, &argv, &ExecOptions::default())
            .await?;
        debug!(resource = %self.name, rule = FIREWALL_RULE_NAME, "Firewall rule created");

        Ok(Some(Endpoint::Database(DatabaseEndpoint {
            host,
            port: DEFAULT_POSTGRES_PORT,
            username: self.username.clone(),
            password: self.password.clone(),
        })))
    }

    async fn delete(&self) -> Result<(), ResourceError> {
        let mut argv = self.server_args("delete");
        argv.push("-y".to_string());

        info!(resource = %self.name, "Deleting postgres server");
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
