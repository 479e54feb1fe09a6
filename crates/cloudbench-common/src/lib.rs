//! cloudbench-common - Shared types and utilities
//!
//! This crate provides the provider-free vocabulary shared by the coordinator
//! and its test utilities: nothing in here talks to a cloud.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`executor`]: The external command executor contract
//! - [`lifecycle`]: Resource lifecycle states and legal transitions
//! - [`resource_kind`]: Resource kinds with provisioning and cleanup ordering
//! - [`run_uri`]: Run-unique token that all resource names derive from
//! - [`sample`]: Benchmark measurement samples
//! - [`spec`]: Declarative resource specifications

pub mod defaults;
pub mod executor;
pub mod lifecycle;
pub mod resource_kind;
pub mod run_uri;
pub mod sample;
pub mod spec;

// Re-export commonly used types
pub use executor::{CommandExecutor, CommandOutput, ExecOptions};
pub use lifecycle::LifecycleState;
pub use resource_kind::ResourceKind;
pub use run_uri::RunUri;
pub use sample::Sample;
pub use spec::{Cloud, DatabaseEngine, DatabaseSpec, DiskSpec, MachineType, VmGroupSpec, VmSpec};

/// Get the current timestamp in milliseconds since UNIX epoch.
///
/// Returns 0 if system time is before the epoch (should never happen in practice).
#[inline]
pub fn timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
