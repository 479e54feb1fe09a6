//! cloudbench: provisions cloud resources, runs a benchmark against them and
//! tears them down again
//!
//! Resources are created through the provider CLIs (`az`), so the CLI must be
//! installed and logged in.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudbench_common::defaults::DEFAULT_RUN_TIMEOUT_SECS;
use cloudbench_common::{Cloud, CommandExecutor, DatabaseEngine, RunUri};
use cloudbench_coordinator::benchmark::{self, Benchmark};
use cloudbench_coordinator::config::{
    BenchmarkSpec, PASSWORD_ENV, RunConfig, RuntimeFlags, SpecOverrides, SpecSource,
    YamlSpecSource,
};
use cloudbench_coordinator::error::{LifecycleError, ResourceError};
use cloudbench_coordinator::executor::ProcessExecutor;
use cloudbench_coordinator::lifecycle::WaitConfig;
use cloudbench_coordinator::orchestrator::{self, BenchmarkRun, CleanupOutcome};
use cloudbench_coordinator::provider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cloudbench")]
#[command(about = "Benchmark managed cloud databases on short-lived resources")]
#[command(version)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Options selecting and shaping a benchmark's resources
#[derive(clap::Args, Debug)]
struct SpecArgs {
    /// Benchmark to run (see `cloudbench list`)
    #[arg(short, long)]
    benchmark: String,

    /// Cloud to provision on (azure, gcp, aws)
    #[arg(long)]
    cloud: Cloud,

    /// Zone or region for every resource (overrides the config)
    #[arg(long)]
    zone: Option<String>,

    /// YAML file deep-merged over the built-in benchmark config
    #[arg(long)]
    config_file: Option<PathBuf>,
}

/// Arguments for the run command (extracted to reduce enum size)
#[derive(clap::Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    spec: SpecArgs,

    /// Managed database engine
    #[arg(long)]
    database: Option<DatabaseEngine>,

    /// Database admin user (default: derived from the run URI)
    #[arg(long)]
    database_username: Option<String>,

    /// Database admin password (default: generated)
    #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
    database_password: Option<String>,

    /// Database engine version (default: provider default)
    #[arg(long)]
    database_version: Option<String>,

    /// Database data disk size in GB
    #[arg(long)]
    data_disk_size: Option<u32>,

    /// Request a highly available database
    #[arg(long)]
    high_availability: bool,

    /// Reuse a run URI instead of generating one
    #[arg(long)]
    run_uri: Option<String>,

    /// Bound on provisioning plus benchmark, in seconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_RUN_TIMEOUT_SECS)]
    run_timeout: u64,

    /// Leave resources running after the benchmark
    #[arg(long)]
    keep: bool,

    /// Output JSON file for results
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> SpecOverrides {
        SpecOverrides {
            database: self.database,
            database_username: self.database_username.clone(),
            database_password: self.database_password.clone(),
            database_version: self.database_version.clone(),
            data_disk_size: self.data_disk_size,
            high_availability: self.high_availability.then_some(true),
            zone: self.spec.zone.clone(),
        }
    }

    fn flags(&self) -> RuntimeFlags {
        RuntimeFlags {
            keep: self.keep,
            run_timeout: (self.run_timeout > 0).then(|| Duration::from_secs(self.run_timeout)),
            output: self.output.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision resources, run a benchmark and tear everything down
    Run(Box<RunArgs>),

    /// Tear down the resources of an earlier run
    Cleanup {
        #[command(flatten)]
        spec: SpecArgs,

        /// Run URI of the run to clean up
        #[arg(long)]
        run_uri: String,
    },

    /// List known benchmarks
    List,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Provider hint for the first resource error in the chain
fn suggestion(e: &anyhow::Error) -> Option<String> {
    e.chain().find_map(|cause| {
        cause
            .downcast_ref::<ResourceError>()
            .or_else(|| {
                cause
                    .downcast_ref::<LifecycleError>()
                    .and_then(LifecycleError::resource_error)
            })
            .and_then(ResourceError::suggestion)
    })
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(hint) = suggestion(e) {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {hint}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match args.command {
        Command::Run(run_args) => handle_run(*run_args).await,
        Command::Cleanup { spec, run_uri } => handle_cleanup(spec, run_uri).await,
        Command::List => {
            handle_list();
            Ok(())
        }
    }
}

/// Load the benchmark's config tree, overlaid with the user's file if given
fn load_tree(bench: &dyn Benchmark, config_file: Option<&Path>) -> Result<serde_yaml::Value> {
    let source = match config_file {
        Some(path) => YamlSpecSource::from_file(path)?,
        None => YamlSpecSource::new(),
    };
    Ok(source.load(bench.name(), bench.default_config())?)
}

/// Exit status after a second Ctrl-C (128 + SIGINT)
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// What the nth Ctrl-C does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Cancel the run; teardown still runs
    Cancel,
    /// Stop waiting for teardown and exit
    Exit,
}

impl Interrupt {
    fn nth(count: u32) -> Self {
        if count <= 1 {
            Interrupt::Cancel
        } else {
            Interrupt::Exit
        }
    }
}

/// Command that removes whatever an aborted run left behind
fn cleanup_command(config: &RunConfig) -> String {
    format!(
        "cloudbench cleanup --benchmark {} --cloud {} --run-uri {}",
        config.benchmark(),
        config.cloud(),
        config.run_uri()
    )
}

/// Cancel `token` on the first Ctrl-C, exit on the second
fn cancel_on_interrupt(token: &CancellationToken, cleanup: String) {
    let token = token.clone();
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            match Interrupt::nth(count) {
                Interrupt::Cancel => {
                    warn!("Interrupted, cancelling run (resources will still be cleaned up, press Ctrl-C again to exit now)");
                    token.cancel();
                }
                Interrupt::Exit => {
                    warn!(
                        cleanup = %cleanup,
                        "Interrupted again, exiting before cleanup finished; resources may remain"
                    );
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }
    });
}

/// Handle the run command
async fn handle_run(args: RunArgs) -> Result<()> {
    let bench = benchmark::lookup(&args.spec.benchmark)?;
    let tree = load_tree(bench.as_ref(), args.spec.config_file.as_deref())?;

    let run_uri = match &args.run_uri {
        Some(uri) => RunUri::parse(uri).context("Invalid --run-uri")?,
        None => RunUri::generate(),
    };
    let spec = BenchmarkSpec::resolve(
        bench.name(),
        tree,
        args.spec.cloud,
        &run_uri,
        &args.overrides(),
    )?;
    let config = RunConfig {
        spec,
        flags: args.flags(),
    };

    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor::new());
    let resources = provider::build_resources(&config.spec, executor.clone())?;

    info!(
        run_uri = %config.run_uri(),
        benchmark = %config.benchmark(),
        cloud = %config.cloud(),
        resources = resources.len(),
        keep = config.keep(),
        "Starting benchmark run"
    );

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel, cleanup_command(&config));

    let report = BenchmarkRun::new(&config, bench.as_ref(), executor, resources)
        .execute(&cancel)
        .await;

    orchestrator::print_results_summary(&report);
    if let Some(path) = config.output() {
        orchestrator::write_results(&report, path)?;
    }

    report.into_result()
}

/// Handle the cleanup command
async fn handle_cleanup(spec_args: SpecArgs, run_uri: String) -> Result<()> {
    let bench = benchmark::lookup(&spec_args.benchmark)?;
    let tree = load_tree(bench.as_ref(), spec_args.config_file.as_deref())?;
    let run_uri = RunUri::parse(&run_uri).context("Invalid --run-uri")?;

    let overrides = SpecOverrides {
        zone: spec_args.zone.clone(),
        ..Default::default()
    };
    let spec = BenchmarkSpec::resolve(bench.name(), tree, spec_args.cloud, &run_uri, &overrides)?;

    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor::new());
    let resources = provider::build_resources(&spec, executor)?;
    info!(run_uri = %run_uri, resources = resources.len(), "Cleaning up earlier run");

    let report = orchestrator::cleanup_leftovers(resources, WaitConfig::deletion()).await;

    println!("\n=== Cleanup Report ===");
    println!("Run URI: {run_uri}");
    println!();
    for entry in &report.resources {
        match &entry.outcome {
            CleanupOutcome::Failed { error } => {
                println!("  {:<40} FAILED: {error}", entry.resource)
            }
            other => println!("  {:<40} {}", entry.resource, other.label()),
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!("{failed} resource(s) could not be deleted");
    }
    Ok(())
}

/// Handle the list command
fn handle_list() {
    for bench in benchmark::all() {
        println!("{:<16} {}", bench.name(), bench.description());
    }
}
