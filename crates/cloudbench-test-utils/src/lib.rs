//! Shared test utilities for cloudbench
//!
//! The [`executor`] module provides a scripted stand-in for the cloud CLIs so
//! that resource, lifecycle and orchestrator tests run without credentials.

pub mod executor;

pub use executor::{FakeExecutor, Invocation};

/// Run URI used across tests
pub const TEST_RUN_URI: &str = "test1234";
