//! Resource lifecycle states
//!
//! The lifecycle controller is the only writer of these states. The legal
//! transitions are encoded here so every controller enforces the same graph.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single cloud resource
///
/// ```text
/// UNCREATED -> CREATING -> WAITING_READY -> READY -> DELETING -> DELETED
///                  \             \                      /
///                   +-------------+------> FAILED <----+
/// ```
///
/// `FAILED` absorbs errors but is not final for billing purposes: a failed
/// resource may still exist and is always eligible for `DELETING`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Nothing has been requested from the provider
    #[default]
    Uncreated,
    /// Create request accepted, provisioning in progress
    Creating,
    /// Polling the provider for readiness
    WaitingReady,
    /// Provider reported ready and post-create metadata is captured
    Ready,
    /// Delete in progress
    Deleting,
    /// Delete confirmed (or nothing was ever created)
    Deleted,
    /// Create, readiness or delete failed
    Failed,
}

impl LifecycleState {
    /// Check whether moving to `next` is a legal transition
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uncreated, Creating)
                | (Uncreated, Failed)
                | (Uncreated, Deleting)
                | (Uncreated, Deleted)
                | (Creating, WaitingReady)
                | (Creating, Failed)
                | (Creating, Deleting)
                | (WaitingReady, Ready)
                | (WaitingReady, Failed)
                | (WaitingReady, Deleting)
                | (Ready, Deleting)
                | (Deleting, Deleted)
                | (Deleting, Failed)
                | (Failed, Deleting)
        )
    }

    /// True once the resource is confirmed gone
    pub fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [Uncreated, Creating, WaitingReady, Ready, Deleting, Deleted];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_failed_reachable_from_in_flight_states() {
        for from in [Creating, WaitingReady, Deleting] {
            assert!(from.can_transition_to(Failed), "{from} -> FAILED");
        }
        assert!(!Ready.can_transition_to(Failed));
        assert!(!Deleted.can_transition_to(Failed));
    }

    #[test]
    fn test_delete_reachable_before_ready() {
        for from in [Creating, WaitingReady, Failed, Ready] {
            assert!(from.can_transition_to(Deleting), "{from} -> DELETING");
        }
    }

    #[test]
    fn test_ready_only_from_waiting() {
        for from in [Uncreated, Creating, Deleting, Deleted, Failed] {
            assert!(!from.can_transition_to(Ready), "{from} -> READY must be illegal");
        }
    }

    #[test]
    fn test_deleted_is_final() {
        for to in [Uncreated, Creating, WaitingReady, Ready, Deleting, Failed] {
            assert!(!Deleted.can_transition_to(to));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(WaitingReady.to_string(), "WAITING_READY");
        assert_eq!(Uncreated.as_ref(), "UNCREATED");
    }
}
