//! Declarative resource specifications
//!
//! Specs are resolved once from configuration for a single cloud and are
//! immutable afterwards: resources copy what they need out of them at
//! construction time. Validation is done via `garde::Validate`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud providers known to the configuration tree
///
/// Serde names match the provider keys used in benchmark configs
/// (`Azure`, `GCP`, `AWS`); `FromStr` accepts them case-insensitively.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Cloud {
    #[serde(rename = "Azure")]
    #[strum(serialize = "azure")]
    Azure,
    #[serde(rename = "GCP")]
    #[strum(serialize = "gcp")]
    Gcp,
    #[serde(rename = "AWS")]
    #[strum(serialize = "aws")]
    Aws,
}

/// Managed database engines
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Postgres,
    Mysql,
}

/// Machine sizing: either a provider machine type name or custom CPU/memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MachineType {
    Named(String),
    Custom { cpus: u32, memory: String },
}

impl MachineType {
    /// CPU count, when the sizing states one
    pub fn cpus(&self) -> Option<u32> {
        match self {
            MachineType::Named(_) => None,
            MachineType::Custom { cpus, .. } => Some(*cpus),
        }
    }

    /// Provider machine type name, when the sizing is a named type
    pub fn name(&self) -> Option<&str> {
        match self {
            MachineType::Named(name) => Some(name),
            MachineType::Custom { .. } => None,
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineType::Named(name) => f.write_str(name),
            MachineType::Custom { cpus, memory } => write!(f, "custom({cpus} vCPU, {memory})"),
        }
    }
}

/// Compute sizing and placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
pub struct VmSpec {
    #[garde(skip)]
    pub machine_type: MachineType,

    /// Zone or region (Azure uses the location name)
    #[garde(length(min = 1))]
    pub zone: String,

    /// OS image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub image: Option<String>,

    /// Project owning the image (GCP only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub image_project: Option<String>,
}

/// Disk sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
pub struct DiskSpec {
    /// Size in GB
    #[garde(range(min = 1))]
    pub disk_size: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub disk_type: Option<String>,
}

/// Managed relational database request
#[derive(Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
pub struct DatabaseSpec {
    #[garde(skip)]
    pub engine: DatabaseEngine,

    /// Engine version; `None` selects the provider default
    #[garde(skip)]
    pub version: Option<String>,

    /// Admin user name
    #[garde(length(min = 1, max = 63))]
    pub username: String,

    /// Admin password
    #[garde(length(min = 8, max = 128))]
    pub password: String,

    /// Database/server name
    #[garde(length(min = 1, max = 63))]
    pub database_name: String,

    #[garde(skip)]
    pub high_availability: bool,

    /// Database tier sizing
    #[garde(dive)]
    pub vm: VmSpec,

    /// Storage sizing
    #[garde(dive)]
    pub disk: DiskSpec,
}

// Manual impl keeps the password out of logs
impl fmt::Debug for DatabaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSpec")
            .field("engine", &self.engine)
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("high_availability", &self.high_availability)
            .field("vm", &self.vm)
            .field("disk", &self.disk)
            .finish()
    }
}

/// A group of identically sized client VMs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
pub struct VmGroupSpec {
    #[garde(dive)]
    pub vm: VmSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(dive)]
    pub disk: Option<DiskSpec>,

    #[serde(default = "default_vm_count")]
    #[garde(range(min = 1))]
    pub vm_count: u32,
}

fn default_vm_count() -> u32 {
    1
}
