//! Default configuration values
//!
//! These constants keep the lifecycle engine, the resources and the CLI in
//! agreement about timing and sizing defaults.

/// Interval between readiness probes (5 seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on waiting for a resource to become ready (6 hours)
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Upper bound on waiting for a deleted resource to disappear (30 minutes)
pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 30 * 60;

/// Overall run timeout covering prepare and run (12 hours, 0 disables)
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 12 * 60 * 60;

/// Default timeout for a single provider command
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Timeout for provider commands that block until provisioning finishes
pub const PROVISIONING_COMMAND_TIMEOUT_SECS: u64 = 60 * 60;

/// Timeout for status and existence probes
pub const PROBE_COMMAND_TIMEOUT_SECS: u64 = 120;

/// Default Postgres version for managed databases
pub const DEFAULT_POSTGRES_VERSION: &str = "9.6";

/// Default Postgres port
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Length of generated database passwords
pub const DEFAULT_PASSWORD_LENGTH: usize = 10;

/// Default admin user on provisioned virtual machines
pub const DEFAULT_VM_USER: &str = "cloudbench";
