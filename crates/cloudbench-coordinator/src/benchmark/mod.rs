//! Benchmarks
//!
//! A [`Benchmark`] owns the workload: its built-in config tree and the
//! prepare/run/cleanup steps executed against resources the orchestrator
//! has already brought to `READY`.

pub mod pgbench;
pub mod remote;

pub use pgbench::Pgbench;
pub use remote::RemoteHost;

use crate::config::BenchmarkSpec;
use crate::error::ConfigError;
use crate::resource::{DatabaseEndpoint, HostEndpoint};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cloudbench_common::{CommandExecutor, Sample};

/// Everything a benchmark step may touch
pub struct BenchmarkContext<'a> {
    pub spec: &'a BenchmarkSpec,
    pub executor: &'a dyn CommandExecutor,
    /// Client VMs, in provisioning order
    pub vms: Vec<HostEndpoint>,
    pub database: Option<DatabaseEndpoint>,
}

impl<'a> BenchmarkContext<'a> {
    /// Remote handle on client VM `index`
    pub fn vm(&self, index: usize) -> Result<RemoteHost<'_>> {
        let endpoint = self
            .vms
            .get(index)
            .with_context(|| format!("Benchmark needs client VM #{index}, none provisioned"))?;
        Ok(RemoteHost::new(endpoint, self.executor))
    }

    pub fn database(&self) -> Result<&DatabaseEndpoint> {
        self.database
            .as_ref()
            .context("Benchmark needs a managed database, none provisioned")
    }
}

#[async_trait]
pub trait Benchmark: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Built-in YAML config, keyed by [`Benchmark::name`]
    fn default_config(&self) -> &'static str;

    /// Install tooling and create workload objects
    async fn prepare(&self, ctx: &BenchmarkContext<'_>) -> Result<()>;

    /// Execute the workload; an empty result is valid
    async fn run(&self, ctx: &BenchmarkContext<'_>) -> Result<Vec<Sample>>;

    /// Workload-side cleanup before resources are torn down
    async fn cleanup(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// All registered benchmarks
pub fn all() -> Vec<Box<dyn Benchmark>> {
    vec![Box::new(Pgbench)]
}

/// Find a benchmark by name
pub fn lookup(name: &str) -> Result<Box<dyn Benchmark>, ConfigError> {
    all()
        .into_iter()
        .find(|b| b.name() == name)
        .ok_or_else(|| ConfigError::UnknownBenchmark(name.to_string()))
}
