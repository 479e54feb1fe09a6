//! pgbench against a managed PostgreSQL database
//!
//! Prepare installs the client tools on the first VM, creates the test
//! database through the server's default `postgres` database and
//! initializes it at the configured scale. Run drives a fixed-duration
//! TPC-B-like load with per-second progress reporting.

use super::{Benchmark, BenchmarkContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cloudbench_common::Sample;
use serde::Deserialize;
use tracing::info;

/// Database the workload runs against
pub const TEST_DB_NAME: &str = "perftest";

/// Database every postgres server has
pub const DEFAULT_DB_NAME: &str = "postgres";

const PACKAGES: &[&str] = &["postgresql-client", "postgresql-contrib"];

/// Workload knobs from the `workload` config section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PgbenchWorkload {
    pub scale_factor: u32,
    pub clients: u32,
    pub jobs: u32,
    pub seconds: u32,
}

impl Default for PgbenchWorkload {
    fn default() -> Self {
        Self {
            scale_factor: 4000,
            clients: 16,
            jobs: 16,
            seconds: 30,
        }
    }
}

impl PgbenchWorkload {
    fn from_spec(workload: &serde_yaml::Value) -> Result<Self> {
        if workload.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(workload.clone()).context("Invalid pgbench workload config")
    }
}

/// libpq connection string, single-quoted for the remote shell
pub fn make_psql_connection_string(
    endpoint: &str,
    user: &str,
    password: &str,
    database: &str,
) -> String {
    format!("'host={endpoint} user={user} password={password} dbname={database}'")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pgbench;

#[async_trait]
impl Benchmark for Pgbench {
    fn name(&self) -> &'static str {
        "pgbench"
    }

    fn description(&self) -> &'static str {
        "pgbench against a managed PostgreSQL database"
    }

    fn default_config(&self) -> &'static str {
        include_str!("pgbench.yaml")
    }

    async fn prepare(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let workload = PgbenchWorkload::from_spec(&ctx.spec.workload)?;
        let vm = ctx.vm(0)?;
        let db = ctx.database()?;

        info!(host = %vm.address(), "Installing pgbench");
        vm.install(PACKAGES).await?;

        let admin = make_psql_connection_string(&db.host, &db.username, &db.password, DEFAULT_DB_NAME);
        info!(database = TEST_DB_NAME, "Creating test database");
        vm.remote_command(&format!(
            "psql {admin} -c \"CREATE DATABASE {TEST_DB_NAME};\""
        ))
        .await
        .context("Failed to create test database")?;

        let test = make_psql_connection_string(&db.host, &db.username, &db.password, TEST_DB_NAME);
        info!(scale_factor = workload.scale_factor, "Initializing pgbench tables");
        vm.remote_command(&format!("pgbench -i -s {} {test}", workload.scale_factor))
            .await
            .context("Failed to initialize pgbench tables")?;
        Ok(())
    }

    async fn run(&self, ctx: &BenchmarkContext<'_>) -> Result<Vec<Sample>> {
        let workload = PgbenchWorkload::from_spec(&ctx.spec.workload)?;
        let vm = ctx.vm(0)?;
        let db = ctx.database()?;

        let test = make_psql_connection_string(&db.host, &db.username, &db.password, TEST_DB_NAME);
        let command = format!(
            "pgbench -c {} -j {} -T {} -P 1 -r {test}",
            workload.clients, workload.jobs, workload.seconds
        );
        info!(
            clients = workload.clients,
            jobs = workload.jobs,
            seconds = workload.seconds,
            "Running pgbench"
        );
        let output = vm.remote_command(&command).await.context("pgbench run failed")?;

        // Progress lines go to stderr, the summary to stdout
        let mut samples = parse_pgbench_output(&output.stderr);
        samples.extend(parse_pgbench_output(&output.stdout));
        let clients = workload.clients.to_string();
        let jobs = workload.jobs.to_string();
        Ok(samples
            .into_iter()
            .map(|s| {
                s.with_metadata("clients", clients.as_str())
                    .with_metadata("jobs", jobs.as_str())
            })
            .collect())
    }
}

/// Extract samples from pgbench output
///
/// Recognizes the summary lines (`tps = `, `latency average = `,
/// `latency stddev = `) and per-second `progress:` lines. Anything else is
/// ignored.
pub fn parse_pgbench_output(output: &str) -> Vec<Sample> {
    let mut samples = Vec::new();
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("progress:") {
            samples.extend(parse_progress(rest));
        } else if let Some(rest) = line.strip_prefix("tps = ") {
            if let Some(value) = leading_number(rest) {
                let mut sample = Sample::new("tps", value, "transactions/s");
                if rest.contains("including") {
                    sample = sample.with_metadata("connections", "including");
                } else if rest.contains("excluding") || rest.contains("without") {
                    sample = sample.with_metadata("connections", "excluding");
                }
                samples.push(sample);
            }
        } else if let Some(rest) = line.strip_prefix("latency average = ") {
            if let Some(value) = leading_number(rest) {
                samples.push(Sample::new("latency_average", value, "ms"));
            }
        } else if let Some(rest) = line.strip_prefix("latency stddev = ") {
            if let Some(value) = leading_number(rest) {
                samples.push(Sample::new("latency_stddev", value, "ms"));
            }
        }
    }
    samples
}

/// `progress: 5.0 s, 1234.5 tps, lat 12.960 ms stddev 3.200`
fn parse_progress(rest: &str) -> Vec<Sample> {
    let mut parts = rest.split(',').map(str::trim);
    let Some(second) = parts.next().and_then(|p| p.strip_suffix(" s")) else {
        return Vec::new();
    };

    let mut samples = Vec::new();
    for part in parts {
        if let Some(tps) = part.strip_suffix(" tps").and_then(|v| v.parse::<f64>().ok()) {
            samples.push(
                Sample::new("tps_progress", tps, "transactions/s").with_metadata("second", second),
            );
        } else if let Some(latency) = part.strip_prefix("lat ").and_then(leading_number) {
            samples.push(
                Sample::new("latency_progress", latency, "ms").with_metadata("second", second),
            );
        }
    }
    samples
}

fn leading_number(s: &str) -> Option<f64> {
    s.split_whitespace().next()?.parse().ok()
}
