//! Cloud provider plumbing
//!
//! - [`error`]: classification of provider CLI failures
//! - [`azure`]: Azure CLI command building and the Azure resource kinds
//! - [`tags`]: tags attached to every created resource

pub mod azure;
pub mod error;
pub mod tags;

pub use error::{ProviderError, classify_cli_error};

use crate::config::BenchmarkSpec;
use crate::error::ConfigError;
use crate::resource::Resource;
use cloudbench_common::{Cloud, CommandExecutor, ResourceKind};
use std::sync::Arc;

/// Build every resource a resolved spec asks for, network container first
pub fn build_resources(
    spec: &BenchmarkSpec,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Vec<Box<dyn Resource>>, ConfigError> {
    match spec.cloud {
        Cloud::Azure => azure::build_resources(spec, executor),
        cloud @ (Cloud::Gcp | Cloud::Aws) => Err(ConfigError::UnsupportedCloud {
            cloud,
            kind: ResourceKind::Network,
        }),
    }
}
