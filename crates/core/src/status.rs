//! Cluster and job state machines.
//!
//! The cluster transition graph is enforced wherever status changes are
//! persisted; job status updates are unconditional overwrites.

use serde::{Deserialize, Serialize};

/// Backend flavor of a cluster, declared at creation time.
///
/// The transport backend is selected from this type at connection
/// acquisition: traditional clusters are reached over an interactive
/// shell session, EC2-provisioned clusters through the provider's
/// gateway REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClusterType {
    #[default]
    #[serde(rename = "ec2")]
    Ec2,
    #[serde(rename = "trad")]
    Traditional,
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ec2 => write!(f, "ec2"),
            Self::Traditional => write!(f, "trad"),
        }
    }
}

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Created,
    Starting,
    Running,
    Terminating,
    Terminated,
}

impl ClusterStatus {
    /// Whether `next` is a legal transition from this state.
    ///
    /// Re-asserting the current state is always allowed so repeated task
    /// callbacks stay idempotent. `Terminated` is absorbing.
    pub fn can_transition_to(self, next: ClusterStatus) -> bool {
        use ClusterStatus::*;
        if self == next {
            return true;
        }
        match self {
            Created => matches!(next, Starting | Terminating),
            // Terminated here is the provisioning-failure edge.
            Starting => matches!(next, Running | Terminating | Terminated),
            Running => matches!(next, Terminating),
            Terminating => matches!(next, Terminated),
            Terminated => false,
        }
    }

    /// Jobs may be submitted only while the cluster is running.
    pub fn accepts_jobs(self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Submitted,
    Running,
    Completed,
    Error,
    Terminated,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Terminated)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_cluster_can_start() {
        assert!(ClusterStatus::Created.can_transition_to(ClusterStatus::Starting));
    }

    #[test]
    fn running_cluster_cannot_restart() {
        assert!(!ClusterStatus::Running.can_transition_to(ClusterStatus::Starting));
        assert!(!ClusterStatus::Running.can_transition_to(ClusterStatus::Created));
    }

    #[test]
    fn running_terminates_directly() {
        assert!(ClusterStatus::Running.can_transition_to(ClusterStatus::Terminating));
    }

    #[test]
    fn starting_may_fail_to_terminated() {
        assert!(ClusterStatus::Starting.can_transition_to(ClusterStatus::Terminated));
    }

    #[test]
    fn terminated_is_absorbing() {
        for next in [
            ClusterStatus::Created,
            ClusterStatus::Starting,
            ClusterStatus::Running,
            ClusterStatus::Terminating,
        ] {
            assert!(!ClusterStatus::Terminated.can_transition_to(next));
        }
    }

    #[test]
    fn reasserting_current_status_is_allowed() {
        assert!(ClusterStatus::Running.can_transition_to(ClusterStatus::Running));
        assert!(ClusterStatus::Terminated.can_transition_to(ClusterStatus::Terminated));
    }

    #[test]
    fn only_running_accepts_jobs() {
        assert!(ClusterStatus::Running.accepts_jobs());
        assert!(!ClusterStatus::Created.accepts_jobs());
        assert!(!ClusterStatus::Starting.accepts_jobs());
        assert!(!ClusterStatus::Terminating.accepts_jobs());
    }

    #[test]
    fn cluster_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ClusterType::Ec2).unwrap(),
            "\"ec2\""
        );
        assert_eq!(
            serde_json::to_string(&ClusterType::Traditional).unwrap(),
            "\"trad\""
        );
    }

    #[test]
    fn job_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Terminated.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
