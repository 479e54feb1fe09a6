//! Core types for the orchestrator

use super::cleanup::CleanupReport;
use chrono::{DateTime, Utc};
use cloudbench_common::{Cloud, RunUri, Sample};
use serde::Serialize;
use thiserror::Error;

/// Phases of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum Phase {
    Prepare,
    Run,
    Cleanup,
}

/// Why a run failed: the phase, the resource responsible (if any) and the
/// underlying cause
#[derive(Debug, Error)]
#[error("{phase} phase failed{}", .resource.as_deref().map(|r| format!(" for '{r}'")).unwrap_or_default())]
pub struct RunError {
    pub phase: Phase,
    pub resource: Option<String>,
    #[source]
    pub source: anyhow::Error,
}

impl RunError {
    pub fn new(phase: Phase, resource: Option<String>, source: anyhow::Error) -> Self {
        Self {
            phase,
            resource,
            source,
        }
    }

    /// The run timeout fired or the user interrupted the run
    pub fn cancelled(phase: Phase) -> Self {
        Self::new(
            phase,
            None,
            anyhow::anyhow!("Run cancelled (timeout reached or interrupted)"),
        )
    }
}

/// Outcome of one benchmark run
#[derive(Debug)]
pub struct RunReport {
    pub run_uri: RunUri,
    pub benchmark: String,
    pub cloud: Cloud,
    pub samples: Vec<Sample>,
    /// First failure; prepare and run failures take precedence over cleanup
    pub failure: Option<RunError>,
    pub cleanup: CleanupReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Convert into a result for the CLI, keeping the error chain
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.failure {
            None => Ok(()),
            Some(e) => Err(e.into()),
        }
    }
}
