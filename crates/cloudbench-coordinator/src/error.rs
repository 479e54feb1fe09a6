//! Typed errors for configuration, resources and the lifecycle controller

use crate::provider::ProviderError;
use cloudbench_common::run_uri::RunUriError;
use cloudbench_common::{Cloud, DatabaseEngine, LifecycleState, ResourceKind};
use thiserror::Error;

/// Construction-time configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No benchmark registered under this name
    #[error("Unknown benchmark '{0}' (see 'cloudbench list')")]
    UnknownBenchmark(String),

    /// Resources of this kind cannot be built for this cloud
    #[error("Cloud '{cloud}' does not support {kind} resources")]
    UnsupportedCloud { cloud: Cloud, kind: ResourceKind },

    /// No default version, or the requested version is not offered
    #[error(
        "Unsupported database/version combination on {cloud}: {engine} {}",
        .version.as_deref().unwrap_or("(default)")
    )]
    UnsupportedDatabase {
        engine: DatabaseEngine,
        version: Option<String>,
        cloud: Cloud,
    },

    /// A requested option this cloud's resource cannot honor
    #[error("Option '{option}' is not supported on {cloud}")]
    UnsupportedOption { option: &'static str, cloud: Cloud },

    /// Benchmark config has no section for a resource it needs
    #[error("Benchmark '{benchmark}' config is missing '{section}'")]
    MissingSection { benchmark: String, section: String },

    /// Resolved spec failed validation
    #[error("Invalid {what}: {message}")]
    Invalid { what: String, message: String },

    #[error("Invalid run URI: {0}")]
    RunUri(#[from] RunUriError),

    /// Failed to parse YAML configuration
    #[error("Failed to parse config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Failed to read configuration file
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error naming where the YAML came from
    pub fn parse(origin: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Parse {
            origin: origin.into(),
            source,
        }
    }

    /// Wrap a garde validation report
    pub fn invalid(what: impl Into<String>, report: &garde::Report) -> Self {
        Self::Invalid {
            what: what.into(),
            message: report.to_string(),
        }
    }
}

/// Resource operations, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    CreateDependencies,
    Create,
    Exists,
    Probe,
    PostCreate,
    Delete,
    DeleteDependencies,
}

/// Failure of a single resource operation
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Provider rejected the request
    #[error("{operation} of '{resource}' was rejected: {source}")]
    Rejected {
        resource: String,
        operation: Operation,
        #[source]
        source: ProviderError,
    },

    /// Command could not be run (spawn failure, command timeout)
    #[error("{operation} of '{resource}' could not be executed")]
    Execution {
        resource: String,
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },

    /// Provider answered with something we cannot interpret
    #[error("Malformed {operation} response for '{resource}': {reason}")]
    MalformedResponse {
        resource: String,
        operation: Operation,
        reason: String,
    },
}

impl ResourceError {
    pub fn operation(&self) -> Operation {
        match self {
            ResourceError::Rejected { operation, .. }
            | ResourceError::Execution { operation, .. }
            | ResourceError::MalformedResponse { operation, .. } => *operation,
        }
    }

    fn provider(&self) -> Option<&ProviderError> {
        match self {
            ResourceError::Rejected { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Provider says the resource does not exist
    pub fn is_not_found(&self) -> bool {
        self.provider().is_some_and(ProviderError::is_not_found)
    }

    /// Provider failure that may succeed on retry
    pub fn is_retryable(&self) -> bool {
        self.provider().is_some_and(ProviderError::is_retryable)
    }

    /// Hint for the user, from the provider classification
    pub fn suggestion(&self) -> Option<String> {
        self.provider().and_then(ProviderError::suggestion)
    }
}

/// Lifecycle controller failures
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Illegal transition for '{resource}': {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Delete was accepted but the resource never went away
    #[error("'{resource}' still exists {waited_secs}s after delete")]
    StillExists { resource: String, waited_secs: u64 },

    /// Readiness wait ended without the resource becoming ready
    #[error("'{resource}' did not become ready: {reason}")]
    NotReady { resource: String, reason: String },

    #[error("Provisioning of '{resource}' was cancelled")]
    Cancelled { resource: String },
}

impl LifecycleError {
    /// Underlying resource error, if any
    pub fn resource_error(&self) -> Option<&ResourceError> {
        match self {
            LifecycleError::Resource(e) => Some(e),
            _ => None,
        }
    }
}
