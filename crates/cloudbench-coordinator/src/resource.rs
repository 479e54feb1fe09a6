//! The resource contract
//!
//! A [`Resource`] is one cloud capability (network container, VM, managed
//! database) that can be created, probed and deleted. Implementations issue
//! provider commands and interpret the answers; they never retry and never
//! track lifecycle state. Sequencing, waiting, retries and state all live in
//! [`crate::lifecycle::LifecycleController`].

use crate::error::ResourceError;
use async_trait::async_trait;
use cloudbench_common::ResourceKind;
use serde::Serialize;
use std::fmt;

/// Provider status as seen by a single readiness probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Provider state string (e.g. "Ready", "Creating", "VM running")
    pub state: String,
    /// Address reported alongside the state, when there is one
    pub endpoint: Option<String>,
}

impl StatusReport {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Outcome of one readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(StatusReport),
    NotReady(StatusReport),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }

    pub fn report(&self) -> &StatusReport {
        match self {
            Readiness::Ready(r) | Readiness::NotReady(r) => r,
        }
    }
}

/// Connection details of a compute instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEndpoint {
    pub address: String,
    pub user: String,
}

/// Connection details of a managed database
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip)]
    pub password: String,
}

impl fmt::Debug for DatabaseEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection metadata captured after readiness
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    Host(HostEndpoint),
    Database(DatabaseEndpoint),
}

impl Endpoint {
    pub fn as_host(&self) -> Option<&HostEndpoint> {
        match self {
            Endpoint::Host(h) => Some(h),
            Endpoint::Database(_) => None,
        }
    }

    pub fn as_database(&self) -> Option<&DatabaseEndpoint> {
        match self {
            Endpoint::Database(d) => Some(d),
            Endpoint::Host(_) => None,
        }
    }
}

/// One cloud resource, driven by a lifecycle controller
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resource: Send + Sync + fmt::Debug {
    fn kind(&self) -> ResourceKind;

    /// Provider-side name, derived from the run URI
    fn name(&self) -> &str;

    /// Runs once before [`Resource::create`]; a failure aborts before
    /// anything billable exists
    async fn create_dependencies(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Ask the provider to begin creation; returns once the request is
    /// accepted
    async fn create(&mut self) -> Result<(), ResourceError>;

    /// Existence probe that assumes nothing about prior state
    async fn exists(&self) -> Result<bool, ResourceError>;

    /// One readiness query against the provider
    ///
    /// A response that cannot be interpreted is
    /// [`ResourceError::MalformedResponse`].
    async fn probe(&self) -> Result<Readiness, ResourceError>;

    /// Runs once after the provider reported ready; returns the connection
    /// metadata to publish
    async fn post_create(
        &mut self,
        _status: &StatusReport,
    ) -> Result<Option<Endpoint>, ResourceError> {
        Ok(None)
    }

    /// Issue the delete. Deleting something already gone must succeed or
    /// fail with a not-found provider error.
    ///
    /// May be called again after a retryable failure.
    async fn delete(&self) -> Result<(), ResourceError>;

    async fn delete_dependencies(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
}
