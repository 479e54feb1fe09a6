//! Main orchestration logic for benchmark runs
//!
//! A [`BenchmarkRun`] provisions the resources built for a spec in dependency
//! stages, hands their endpoints to the benchmark, collects samples and then
//! tears everything down. Teardown runs on every path out of a run: success,
//! failure, run timeout and interruption.

pub mod cleanup;
pub mod results;
pub mod types;

pub use cleanup::{CleanupOutcome, CleanupReport, ResourceCleanup, cleanup_leftovers, teardown_all};
pub use results::{print_results_summary, write_results};
pub use types::{Phase, RunError, RunReport};

use crate::benchmark::{Benchmark, BenchmarkContext};
use crate::config::RunConfig;
use crate::lifecycle::LifecycleController;
use crate::resource::{Endpoint, Resource};
use chrono::Utc;
use cloudbench_common::{CommandExecutor, Sample};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// One benchmark run over a fixed set of resources
pub struct BenchmarkRun<'a> {
    config: &'a RunConfig,
    benchmark: &'a dyn Benchmark,
    executor: Arc<dyn CommandExecutor>,
    controllers: Vec<LifecycleController>,
}

impl<'a> BenchmarkRun<'a> {
    pub fn new(
        config: &'a RunConfig,
        benchmark: &'a dyn Benchmark,
        executor: Arc<dyn CommandExecutor>,
        resources: Vec<Box<dyn Resource>>,
    ) -> Self {
        let controllers = resources
            .into_iter()
            .map(|r| {
                LifecycleController::new(r)
                    .with_ready_wait(config.flags.ready_wait)
                    .with_delete_wait(config.flags.delete_wait)
            })
            .collect();
        Self {
            config,
            benchmark,
            executor,
            controllers,
        }
    }

    pub fn controllers(&self) -> &[LifecycleController] {
        &self.controllers
    }

    /// Provision, prepare, run and clean up
    ///
    /// Never returns early: whatever happens before cleanup, every resource
    /// that had a create step issued gets a teardown (unless `--keep`).
    #[instrument(skip_all, fields(run_uri = %self.config.run_uri(), benchmark = %self.config.benchmark()))]
    pub async fn execute(mut self, cancel: &CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let run_token = cancel.child_token();

        let timer = self.config.flags.run_timeout.map(|limit| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(timeout_secs = limit.as_secs(), "Run timeout reached, cancelling");
                token.cancel();
            })
        });

        let mut samples = Vec::new();
        let mut failure = None;
        match self.prepare(&run_token).await {
            Ok(()) => {
                match self.run(&run_token).await {
                    Ok(s) => samples = s,
                    Err(e) => {
                        error!(error = %e, "Benchmark run failed");
                        failure = Some(e);
                    }
                }
                self.benchmark_cleanup().await;
            }
            Err(e) => {
                error!(error = %e, "Prepare failed");
                failure = Some(e);
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        self.finish(samples, failure, started_at).await
    }

    async fn finish(
        mut self,
        samples: Vec<Sample>,
        mut failure: Option<RunError>,
        started_at: chrono::DateTime<Utc>,
    ) -> RunReport {
        let cleanup = if self.config.keep() {
            let kept = CleanupReport::kept(&self.controllers);
            for entry in &kept.resources {
                warn!(resource = %entry.resource, "Keeping resource (--keep)");
            }
            kept
        } else {
            info!("Cleaning up resources");
            teardown_all(&mut self.controllers).await
        };

        if failure.is_none() {
            let failed: Vec<&str> = cleanup.failures().map(|r| r.resource.as_str()).collect();
            if let Some(first) = failed.first() {
                failure = Some(RunError::new(
                    Phase::Cleanup,
                    Some(first.to_string()),
                    anyhow::anyhow!(
                        "{} resource(s) could not be deleted: {}",
                        failed.len(),
                        failed.join(", ")
                    ),
                ));
            }
        }

        RunReport {
            run_uri: self.config.run_uri().clone(),
            benchmark: self.config.benchmark().to_string(),
            cloud: self.config.cloud(),
            samples,
            failure,
            cleanup,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Bring every resource to `READY`, then run the benchmark's prepare step
    async fn prepare(&mut self, cancel: &CancellationToken) -> Result<(), RunError> {
        self.provision_all(cancel).await?;

        let ctx = self.context();
        info!(
            vms = ctx.vms.len(),
            database = ctx.database.is_some(),
            "Preparing benchmark"
        );
        tokio::select! {
            result = self.benchmark.prepare(&ctx) => {
                result.map_err(|e| RunError::new(Phase::Prepare, None, e))
            }
            _ = cancel.cancelled() => Err(RunError::cancelled(Phase::Prepare)),
        }
    }

    /// Provision stage by stage; resources within a stage go concurrently
    ///
    /// The first failure in a stage cancels its siblings and stops later
    /// stages from starting.
    async fn provision_all(&mut self, cancel: &CancellationToken) -> Result<(), RunError> {
        let mut stages: Vec<u8> = self
            .controllers
            .iter()
            .map(|c| c.kind().provision_stage())
            .collect();
        stages.sort_unstable();
        stages.dedup();

        for stage in stages {
            if cancel.is_cancelled() {
                return Err(RunError::cancelled(Phase::Prepare));
            }
            let stage_token = cancel.child_token();
            let token = &stage_token;

            let mut pending: FuturesUnordered<_> = self
                .controllers
                .iter_mut()
                .filter(|c| c.kind().provision_stage() == stage)
                .map(|c| async move {
                    let result = c.provision(token).await;
                    (c.name().to_string(), result)
                })
                .collect();
            info!(stage, resources = pending.len(), "Provisioning stage");

            let mut first_failure = None;
            while let Some((resource, result)) = pending.next().await {
                if let Err(e) = result {
                    if first_failure.is_none() {
                        error!(resource = %resource, error = %e, "Provisioning failed");
                        token.cancel();
                        first_failure = Some(RunError::new(Phase::Prepare, Some(resource), e.into()));
                    } else {
                        warn!(resource = %resource, error = %e, "Provisioning stopped");
                    }
                }
            }
            drop(pending);

            if let Some(failure) = first_failure {
                return Err(failure);
            }
        }
        Ok(())
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<Vec<Sample>, RunError> {
        let ctx = self.context();
        info!("Running benchmark");
        let samples = tokio::select! {
            result = self.benchmark.run(&ctx) => {
                result.map_err(|e| RunError::new(Phase::Run, None, e))?
            }
            _ = cancel.cancelled() => return Err(RunError::cancelled(Phase::Run)),
        };
        info!(samples = samples.len(), "Benchmark finished");

        let run_uri = self.config.run_uri().to_string();
        let cloud = self.config.cloud().to_string();
        let benchmark = self.config.benchmark().to_string();
        Ok(samples
            .into_iter()
            .map(|s| {
                s.with_metadata("run_uri", run_uri.as_str())
                    .with_metadata("cloud", cloud.as_str())
                    .with_metadata("benchmark", benchmark.as_str())
            })
            .collect())
    }

    /// Workload-side cleanup; failures are logged only
    async fn benchmark_cleanup(&self) {
        let ctx = self.context();
        if let Err(e) = self.benchmark.cleanup(&ctx).await {
            warn!(error = %e, "Benchmark cleanup failed");
        }
    }

    /// Endpoints of every ready resource, in provisioning order
    fn context(&self) -> BenchmarkContext<'_> {
        let mut vms = Vec::new();
        let mut database = None;
        for controller in &self.controllers {
            match controller.endpoint() {
                Some(Endpoint::Host(host)) => vms.push(host.clone()),
                Some(Endpoint::Database(db)) => database = Some(db.clone()),
                None => {}
            }
        }
        BenchmarkContext {
            spec: &self.config.spec,
            executor: self.executor.as_ref(),
            vms,
            database,
        }
    }
}
