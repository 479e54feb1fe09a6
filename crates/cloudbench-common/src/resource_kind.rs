//! Resource kinds and their ordering
//!
//! Resources must be provisioned and torn down in dependency order: the
//! network container has to exist before anything is placed in it, and must
//! go last on the way out.

use serde::{Deserialize, Serialize};

/// Kinds of cloud resources managed by cloudbench
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
    strum::AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Network container (resource group / VPC) holding the other resources
    Network,
    /// Compute instance running the workload client
    VirtualMachine,
    /// Managed relational database under test
    ManagedDatabase,
}

impl ResourceKind {
    /// Get provisioning stage (lower number = provision first)
    ///
    /// Kinds in the same stage share no dependencies and may be created
    /// concurrently.
    pub fn provision_stage(self) -> u8 {
        match self {
            ResourceKind::Network => 0,
            ResourceKind::VirtualMachine => 1,
            ResourceKind::ManagedDatabase => 1,
        }
    }

    /// Get cleanup priority (lower number = cleanup first)
    ///
    /// - 0: VMs and databases (live inside the network container)
    /// - 1: Network container
    pub fn cleanup_priority(self) -> u8 {
        match self {
            ResourceKind::VirtualMachine => 0,
            ResourceKind::ManagedDatabase => 0,
            ResourceKind::Network => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_provisioned_first() {
        assert!(
            ResourceKind::Network.provision_stage()
                < ResourceKind::VirtualMachine.provision_stage()
        );
        assert!(
            ResourceKind::Network.provision_stage()
                < ResourceKind::ManagedDatabase.provision_stage()
        );
    }

    #[test]
    fn test_network_cleaned_last() {
        assert!(
            ResourceKind::VirtualMachine.cleanup_priority()
                < ResourceKind::Network.cleanup_priority(),
            "Instances must be deleted before their network"
        );
        assert!(
            ResourceKind::ManagedDatabase.cleanup_priority()
                < ResourceKind::Network.cleanup_priority()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourceKind::ManagedDatabase.to_string(), "managed-database");
        assert_eq!(ResourceKind::VirtualMachine.as_ref(), "virtual-machine");
    }
}
