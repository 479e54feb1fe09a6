//! Resource teardown
//!
//! Resources are torn down in cleanup-priority order (VMs and databases
//! before the network container holding them). Resources sharing a priority
//! are deleted concurrently. A failed teardown is logged and recorded; it
//! never stops the others.

use crate::lifecycle::{LifecycleController, TeardownOutcome, WaitConfig};
use crate::resource::Resource;
use cloudbench_common::ResourceKind;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

/// Teardown result for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Deleted,
    AlreadyAbsent,
    NothingCreated,
    /// Left running on request
    Kept,
    Failed { error: String },
}

impl From<TeardownOutcome> for CleanupOutcome {
    fn from(outcome: TeardownOutcome) -> Self {
        match outcome {
            TeardownOutcome::Deleted => CleanupOutcome::Deleted,
            TeardownOutcome::AlreadyAbsent => CleanupOutcome::AlreadyAbsent,
            TeardownOutcome::NothingCreated | TeardownOutcome::AlreadyDeleted => {
                CleanupOutcome::NothingCreated
            }
        }
    }
}

impl CleanupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CleanupOutcome::Deleted => "deleted",
            CleanupOutcome::AlreadyAbsent => "already absent",
            CleanupOutcome::NothingCreated => "nothing created",
            CleanupOutcome::Kept => "kept",
            CleanupOutcome::Failed { .. } => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceCleanup {
    pub resource: String,
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub outcome: CleanupOutcome,
}

/// Teardown results for every resource of a run, in teardown order
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub resources: Vec<ResourceCleanup>,
}

impl CleanupReport {
    /// Report for a run whose resources are deliberately left running
    pub fn kept(controllers: &[LifecycleController]) -> Self {
        let resources = controllers
            .iter()
            .filter(|c| c.needs_teardown())
            .map(|c| ResourceCleanup {
                resource: c.name().to_string(),
                kind: c.kind(),
                outcome: CleanupOutcome::Kept,
            })
            .collect();
        Self { resources }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceCleanup> {
        self.resources
            .iter()
            .filter(|r| matches!(r.outcome, CleanupOutcome::Failed { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome_of(&self, resource: &str) -> Option<&CleanupOutcome> {
        self.resources
            .iter()
            .find(|r| r.resource == resource)
            .map(|r| &r.outcome)
    }
}

/// Tear down every controller, exactly once each
pub async fn teardown_all(controllers: &mut [LifecycleController]) -> CleanupReport {
    let mut priorities: Vec<u8> = controllers
        .iter()
        .map(|c| c.kind().cleanup_priority())
        .collect();
    priorities.sort_unstable();
    priorities.dedup();

    let mut report = CleanupReport::default();
    for priority in priorities {
        let results = join_all(
            controllers
                .iter_mut()
                .filter(|c| c.kind().cleanup_priority() == priority)
                .map(|c| async move {
                    let result = c.teardown().await;
                    (c.name().to_string(), c.kind(), result)
                }),
        )
        .await;

        for (resource, kind, result) in results {
            let outcome = match result {
                Ok(outcome) => {
                    info!(resource = %resource, outcome = %outcome, "Cleaned up");
                    CleanupOutcome::from(outcome)
                }
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Cleanup failed");
                    CleanupOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.resources.push(ResourceCleanup {
                resource,
                kind,
                outcome,
            });
        }
    }
    report
}

/// Tear down resources left behind by an earlier run
pub async fn cleanup_leftovers(
    resources: Vec<Box<dyn Resource>>,
    delete_wait: WaitConfig,
) -> CleanupReport {
    let mut controllers: Vec<LifecycleController> = resources
        .into_iter()
        .map(|r| LifecycleController::adopt(r).with_delete_wait(delete_wait))
        .collect();
    teardown_all(&mut controllers).await
}
