//! Lifecycle controller
//!
//! [`LifecycleController`] owns one [`Resource`] and is the only writer of
//! its lifecycle state and endpoint. It sequences the resource's operations,
//! bounds every wait, retries deletes on throttling, and makes sure a delete
//! is attempted whenever any create step was issued.

pub mod wait;

pub use wait::{WaitConfig, WaitOutcome, wait_until};

use crate::error::{LifecycleError, ResourceError};
use crate::resource::{Endpoint, Readiness, Resource};
use backon::{ExponentialBuilder, Retryable};
use cloudbench_common::{LifecycleState, ResourceKind};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry policy for retryable delete failures
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_times: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_times: 5,
        }
    }
}

/// What teardown found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// Delete issued and absence confirmed
    Deleted,
    /// Provider had no such resource, nothing to delete
    AlreadyAbsent,
    /// No create step was ever issued
    NothingCreated,
    /// An earlier teardown already finished
    AlreadyDeleted,
}

/// Drives one resource through its lifecycle
#[derive(Debug)]
pub struct LifecycleController {
    resource: Box<dyn Resource>,
    state: LifecycleState,
    history: Vec<LifecycleState>,
    deps_started: bool,
    create_issued: bool,
    polls: u32,
    endpoint: Option<Endpoint>,
    failure: Option<String>,
    ready_wait: WaitConfig,
    delete_wait: WaitConfig,
    delete_retry: RetryConfig,
}

impl LifecycleController {
    pub fn new(resource: Box<dyn Resource>) -> Self {
        Self {
            resource,
            state: LifecycleState::Uncreated,
            history: vec![LifecycleState::Uncreated],
            deps_started: false,
            create_issued: false,
            polls: 0,
            endpoint: None,
            failure: None,
            ready_wait: WaitConfig::readiness(),
            delete_wait: WaitConfig::deletion(),
            delete_retry: RetryConfig::default(),
        }
    }

    /// Controller for a resource an earlier run may have left behind
    ///
    /// Nothing is known about it, so teardown probes and deletes it as if
    /// every create step had been issued.
    pub fn adopt(resource: Box<dyn Resource>) -> Self {
        let mut controller = Self::new(resource);
        controller.deps_started = true;
        controller.create_issued = true;
        controller
    }

    pub fn with_ready_wait(mut self, config: WaitConfig) -> Self {
        self.ready_wait = config;
        self
    }

    pub fn with_delete_wait(mut self, config: WaitConfig) -> Self {
        self.delete_wait = config;
        self
    }

    pub fn with_delete_retry(mut self, config: RetryConfig) -> Self {
        self.delete_retry = config;
        self
    }

    pub fn name(&self) -> &str {
        self.resource.name()
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state entered, starting with `UNCREATED`
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Readiness probes issued so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Connection metadata, populated once `READY`
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Cause of the most recent failure
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    /// True once any create step was issued, so the provider may hold
    /// something that needs deleting
    pub fn needs_teardown(&self) -> bool {
        (self.deps_started || self.create_issued) && !self.state.is_deleted()
    }

    fn transition(&mut self, next: LifecycleState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                resource: self.name().to_string(),
                from: self.state,
                to: next,
            });
        }
        debug!(resource = %self.name(), from = %self.state, to = %next, "State transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a failure and move to `FAILED`
    fn fail(&mut self, cause: String) {
        error!(resource = %self.name(), state = %self.state, cause = %cause, "Resource failed");
        self.failure = Some(cause);
        if self.state.can_transition_to(LifecycleState::Failed) {
            self.state = LifecycleState::Failed;
            self.history.push(LifecycleState::Failed);
        }
    }

    /// Create dependencies, then issue the create
    ///
    /// Create is never retried. On success the resource is `CREATING`.
    pub async fn create(&mut self) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Uncreated {
            return Err(LifecycleError::InvalidTransition {
                resource: self.name().to_string(),
                from: self.state,
                to: LifecycleState::Creating,
            });
        }

        self.deps_started = true;
        if let Err(e) = self.resource.create_dependencies().await {
            self.fail(e.to_string());
            return Err(e.into());
        }

        // Even a rejected create may have left something behind
        self.create_issued = true;
        if let Err(e) = self.resource.create().await {
            self.fail(e.to_string());
            return Err(e.into());
        }

        info!(resource = %self.name(), kind = %self.kind(), "Create accepted");
        self.transition(LifecycleState::Creating)
    }

    /// Poll until ready, then run post-create
    ///
    /// Returns `false` on timeout, on a malformed or failed probe, on a
    /// post-create failure, or on cancellation. All of those leave the
    /// resource `FAILED` and eligible for teardown.
    pub async fn is_ready(&mut self, cancel: &CancellationToken) -> bool {
        match self.state {
            LifecycleState::Ready => return true,
            LifecycleState::Creating => {
                if let Err(e) = self.transition(LifecycleState::WaitingReady) {
                    self.fail(e.to_string());
                    return false;
                }
            }
            LifecycleState::WaitingReady => {}
            other => {
                warn!(resource = %self.name(), state = %other, "Readiness requested before create");
                return false;
            }
        }

        let resource = self.resource.as_ref();
        let name = resource.name();
        let outcome = wait_until(
            &self.ready_wait,
            Some(cancel),
            move || async move {
                match resource.probe().await? {
                    Readiness::Ready(report) => Ok::<_, ResourceError>(Some(report)),
                    Readiness::NotReady(report) => {
                        info!(resource = %name, state = %report.state, "Not ready yet");
                        Ok(None)
                    }
                }
            },
            name,
        )
        .await;
        self.polls += outcome.polls();

        let report = match outcome {
            WaitOutcome::Ready { value, .. } => value,
            WaitOutcome::TimedOut { polls } => {
                self.fail(format!(
                    "timed out after {}s waiting to be ready ({polls} polls)",
                    self.ready_wait.timeout.as_secs()
                ));
                return false;
            }
            WaitOutcome::Cancelled { .. } => {
                self.fail("cancelled while waiting to be ready".to_string());
                return false;
            }
            WaitOutcome::Failed { error, .. } => {
                self.fail(error.to_string());
                return false;
            }
        };

        match self.resource.post_create(&report).await {
            Ok(endpoint) => {
                self.endpoint = endpoint;
            }
            Err(e) => {
                self.fail(e.to_string());
                return false;
            }
        }

        if let Err(e) = self.transition(LifecycleState::Ready) {
            self.fail(e.to_string());
            return false;
        }
        info!(resource = %self.name(), polls = self.polls, "Resource ready");
        true
    }

    /// Create and wait for readiness, with create cancellable by `cancel`
    pub async fn provision(&mut self, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        let created = tokio::select! {
            result = self.create() => Some(result),
            _ = cancel.cancelled() => None,
        };
        match created {
            Some(result) => result?,
            None => {
                self.fail("cancelled during create".to_string());
                return Err(LifecycleError::Cancelled {
                    resource: self.name().to_string(),
                });
            }
        }

        if self.is_ready(cancel).await {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(LifecycleError::Cancelled {
                resource: self.name().to_string(),
            });
        }
        Err(LifecycleError::NotReady {
            resource: self.name().to_string(),
            reason: self.failure.clone().unwrap_or_default(),
        })
    }

    /// Delete the resource and its dependencies, idempotently
    ///
    /// Skips the delete only when the provider reports the resource absent.
    /// A failure leaves the resource `FAILED` so teardown can be retried.
    pub async fn teardown(&mut self) -> Result<TeardownOutcome, LifecycleError> {
        if self.state.is_deleted() {
            return Ok(TeardownOutcome::AlreadyDeleted);
        }

        if !self.deps_started && !self.create_issued {
            if self.state != LifecycleState::Uncreated {
                self.transition(LifecycleState::Deleting)?;
            }
            self.transition(LifecycleState::Deleted)?;
            debug!(resource = %self.name(), "Nothing was created");
            return Ok(TeardownOutcome::NothingCreated);
        }

        self.transition(LifecycleState::Deleting)?;

        let mut outcome = TeardownOutcome::Deleted;
        if self.create_issued {
            match self.delete_resource().await {
                Ok(o) => outcome = o,
                Err(e) => {
                    self.fail(e.to_string());
                    return Err(e);
                }
            }
        }

        if self.deps_started {
            if let Err(e) = self.resource.delete_dependencies().await {
                self.fail(e.to_string());
                return Err(e.into());
            }
        }

        self.transition(LifecycleState::Deleted)?;
        info!(resource = %self.name(), outcome = %outcome, "Teardown complete");
        Ok(outcome)
    }

    async fn delete_resource(&mut self) -> Result<TeardownOutcome, LifecycleError> {
        match self.resource.exists().await {
            Ok(false) => {
                info!(resource = %self.name(), "Resource does not exist, skipping delete");
                return Ok(TeardownOutcome::AlreadyAbsent);
            }
            Ok(true) => {}
            // Only a not-found answer proves absence
            Err(e) => {
                warn!(resource = %self.name(), error = %e, "Existence check failed, deleting anyway");
            }
        }

        match self.delete_with_retry().await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(resource = %self.name(), "Resource already gone");
                return Ok(TeardownOutcome::AlreadyAbsent);
            }
            Err(e) => return Err(e.into()),
        }

        self.wait_until_absent().await?;
        Ok(TeardownOutcome::Deleted)
    }

    async fn delete_with_retry(&self) -> Result<(), ResourceError> {
        let resource = self.resource.as_ref();
        (move || async move { resource.delete().await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.delete_retry.min_delay)
                    .with_max_delay(self.delete_retry.max_delay)
                    .with_max_times(self.delete_retry.max_times)
                    .with_jitter(),
            )
            .when(ResourceError::is_retryable)
            .notify(|e, dur| {
                warn!(
                    resource = %resource.name(),
                    delay = ?dur,
                    error = %e,
                    "Delete rejected, retrying..."
                );
            })
            .await
    }

    /// Poll until the provider stops reporting the resource
    ///
    /// Throttled checks count as "still there"; any other failed check ends
    /// the wait with an error.
    async fn wait_until_absent(&self) -> Result<(), LifecycleError> {
        let resource = self.resource.as_ref();
        let outcome = wait_until(
            &self.delete_wait,
            None,
            move || async move {
                match resource.exists().await {
                    Ok(exists) => Ok::<_, ResourceError>((!exists).then_some(())),
                    Err(e) if e.is_retryable() => {
                        warn!(resource = %resource.name(), error = %e, "Existence check rejected, polling again");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            },
            resource.name(),
        )
        .await;

        match outcome {
            WaitOutcome::Ready { .. } => Ok(()),
            WaitOutcome::Failed { error, .. } => Err(error.into()),
            WaitOutcome::TimedOut { .. } | WaitOutcome::Cancelled { .. } => {
                Err(LifecycleError::StillExists {
                    resource: self.name().to_string(),
                    waited_secs: self.delete_wait.timeout.as_secs(),
                })
            }
        }
    }
}
