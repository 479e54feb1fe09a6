//! Bounded polling with cancellation support.
//!
//! The loop polls first and then sleeps a fixed interval, until the check
//! yields a value, the overall bound elapses, or the token is cancelled.
//! Time is measured with `tokio::time::Instant` so tests can run 6-hour
//! bounds on a paused clock.

use cloudbench_common::defaults::{
    DEFAULT_DELETE_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_READY_TIMEOUT_SECS,
};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between checks
    pub interval: Duration,
    /// Maximum total time to wait before giving up
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::readiness()
    }
}

impl WaitConfig {
    /// Waiting for a created resource to become ready (5s / 6h)
    pub fn readiness() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
        }
    }

    /// Waiting for a deleted resource to disappear (5s / 30m)
    pub fn deletion() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_DELETE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// How a wait ended
#[derive(Debug)]
pub enum WaitOutcome<T, E> {
    /// The check produced a value on poll number `polls`
    Ready { value: T, polls: u32 },
    /// The bound elapsed first
    TimedOut { polls: u32 },
    /// The token was cancelled
    Cancelled { polls: u32 },
    /// The check itself failed; the wait stops at the first error
    Failed { error: E, polls: u32 },
}

impl<T, E> WaitOutcome<T, E> {
    pub fn polls(&self) -> u32 {
        match self {
            WaitOutcome::Ready { polls, .. }
            | WaitOutcome::TimedOut { polls }
            | WaitOutcome::Cancelled { polls }
            | WaitOutcome::Failed { polls, .. } => *polls,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }
}

/// Poll `check` until it yields `Some(value)`.
///
/// `Ok(None)` means "not yet". An `Err` ends the wait immediately: a check
/// that cannot interpret the provider's answer will not do better on the
/// next poll.
pub async fn wait_until<T, E, F, Fut>(
    config: &WaitConfig,
    cancel: Option<&CancellationToken>,
    mut check: F,
    resource_name: &str,
) -> WaitOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        // Check cancellation before each attempt
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!(resource = %resource_name, polls, "Wait cancelled");
            return WaitOutcome::Cancelled { polls };
        }

        polls += 1;
        match check().await {
            Ok(Some(value)) => {
                debug!(resource = %resource_name, polls, "Wait finished");
                return WaitOutcome::Ready { value, polls };
            }
            Ok(None) => {}
            Err(error) => {
                warn!(resource = %resource_name, polls, error = %error, "Check failed");
                return WaitOutcome::Failed { error, polls };
            }
        }

        if start.elapsed() >= config.timeout {
            return WaitOutcome::TimedOut { polls };
        }

        debug!(
            resource = %resource_name,
            polls,
            delay_ms = config.interval.as_millis(),
            "Not ready, retrying"
        );

        // Wait with cancellation support
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = async {
                if let Some(token) = cancel {
                    token.cancelled().await
                } else {
                    std::future::pending::<()>().await
                }
            } => {
                return WaitOutcome::Cancelled { polls };
            }
        }
    }
}
