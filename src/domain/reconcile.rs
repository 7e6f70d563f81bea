//! Reconciliation decision table.
//!
//! Classifying a requested deployment is a pure function of what is
//! registered, what is running and the operator's policy. The resulting
//! [`ReconcilePlan`] tells the application layer exactly which registry and
//! cluster mutations to perform.
//!
//! | State              | Record    | Cleanup             | Reload | Readiness |
//! |--------------------|-----------|---------------------|--------|-----------|
//! | `NotExists`        | insert    | all resources       | full   | 240s      |
//! | `ExistsNoPod`      | replace   | all resources       | full   | 240s      |
//! | `ExistsPodStale`   | replace   | deployment and pod  | narrow | 240s      |
//! | `ExistsPodCurrent` | replace   | pod only            | narrow | 40s       |

use std::fmt;
use std::time::Duration;

/// Readiness budget after a full reload (cold pulls and rescheduling).
pub const FULL_RELOAD_READINESS: Duration = Duration::from_secs(240);
/// Readiness budget after a soft pod restart.
pub const SOFT_RESTART_READINESS: Duration = Duration::from_secs(40);

/// How the tool is being driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineMode {
    /// An operator at a terminal.
    #[default]
    Interactive,
    /// A CI/CD pipeline; always performs a full cycle.
    Automated,
}

/// Observed state of a requested deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentState {
    /// No registry record with this name.
    NotExists,
    /// Registered, but no pod matches `deployment=<name>`.
    ExistsNoPod,
    /// Registered and running, but policy requires a full cycle.
    ExistsPodStale,
    /// Registered and running; a pod restart picks up the new tag.
    ExistsPodCurrent,
}

impl DeploymentState {
    /// Classify from the observed facts and policy.
    #[must_use]
    pub fn classify(record_exists: bool, pod_exists: bool, force: bool, mode: PipelineMode) -> Self {
        match (record_exists, pod_exists) {
            (false, _) => Self::NotExists,
            (true, false) => Self::ExistsNoPod,
            (true, true) if force || mode == PipelineMode::Automated => Self::ExistsPodStale,
            (true, true) => Self::ExistsPodCurrent,
        }
    }

    /// The actions this state requires.
    #[must_use]
    pub fn plan(self) -> ReconcilePlan {
        let (replace_record, cleanup, reload, readiness_timeout) = match self {
            Self::NotExists => (
                false,
                CleanupScope::All,
                ReloadScope::Full,
                FULL_RELOAD_READINESS,
            ),
            Self::ExistsNoPod => (
                true,
                CleanupScope::All,
                ReloadScope::Full,
                FULL_RELOAD_READINESS,
            ),
            Self::ExistsPodStale => (
                true,
                CleanupScope::Workload,
                ReloadScope::Narrow,
                FULL_RELOAD_READINESS,
            ),
            Self::ExistsPodCurrent => (
                true,
                CleanupScope::Pod,
                ReloadScope::Narrow,
                SOFT_RESTART_READINESS,
            ),
        };
        ReconcilePlan {
            state: self,
            replace_record,
            cleanup,
            reload,
            readiness_timeout,
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotExists => "not-exists",
            Self::ExistsNoPod => "exists-no-pod",
            Self::ExistsPodStale => "exists-pod-stale",
            Self::ExistsPodCurrent => "exists-pod-current",
        };
        f.write_str(label)
    }
}

/// Which of a deployment's cluster objects are deleted before reloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupScope {
    /// Only the pod; the unchanged deployment spec recreates it.
    Pod,
    /// The deployment and its pods.
    Workload,
    /// Deployment, service and pods.
    All,
}

/// How far a reload propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadScope {
    /// Recreate managed objects, rewrite the workspace document and signal
    /// the scheduling service.
    Full,
    /// Recreate managed objects only.
    Narrow,
}

/// The mutations chosen for one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub state: DeploymentState,
    /// Remove the existing record before inserting the new one.
    pub replace_record: bool,
    pub cleanup: CleanupScope,
    pub reload: ReloadScope,
    /// How long the status watcher waits for readiness.
    pub readiness_timeout: Duration,
}

impl ReconcilePlan {
    /// True when the scheduling service is told to reload its locations.
    #[must_use]
    pub fn is_full_reload(&self) -> bool {
        self.reload == ReloadScope::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [PipelineMode; 2] = [PipelineMode::Interactive, PipelineMode::Automated];

    #[test]
    fn missing_record_is_always_not_exists() {
        for pod in [false, true] {
            for force in [false, true] {
                for mode in MODES {
                    assert_eq!(
                        DeploymentState::classify(false, pod, force, mode),
                        DeploymentState::NotExists
                    );
                }
            }
        }
    }

    #[test]
    fn missing_pod_wins_over_policy() {
        for force in [false, true] {
            for mode in MODES {
                assert_eq!(
                    DeploymentState::classify(true, false, force, mode),
                    DeploymentState::ExistsNoPod
                );
            }
        }
    }

    #[test]
    fn force_or_automation_makes_running_pod_stale() {
        assert_eq!(
            DeploymentState::classify(true, true, true, PipelineMode::Interactive),
            DeploymentState::ExistsPodStale
        );
        assert_eq!(
            DeploymentState::classify(true, true, false, PipelineMode::Automated),
            DeploymentState::ExistsPodStale
        );
        assert_eq!(
            DeploymentState::classify(true, true, false, PipelineMode::Interactive),
            DeploymentState::ExistsPodCurrent
        );
    }

    #[test]
    fn classification_is_deterministic() {
        for record in [false, true] {
            for pod in [false, true] {
                for force in [false, true] {
                    for mode in MODES {
                        let first = DeploymentState::classify(record, pod, force, mode).plan();
                        let second = DeploymentState::classify(record, pod, force, mode).plan();
                        assert_eq!(first, second);
                    }
                }
            }
        }
    }

    #[test]
    fn plans_match_action_table() {
        let plan = DeploymentState::NotExists.plan();
        assert!(!plan.replace_record);
        assert_eq!(plan.cleanup, CleanupScope::All);
        assert!(plan.is_full_reload());
        assert_eq!(plan.readiness_timeout, Duration::from_secs(240));

        let plan = DeploymentState::ExistsNoPod.plan();
        assert!(plan.replace_record);
        assert_eq!(plan.cleanup, CleanupScope::All);
        assert!(plan.is_full_reload());
        assert_eq!(plan.readiness_timeout, Duration::from_secs(240));

        let plan = DeploymentState::ExistsPodStale.plan();
        assert!(plan.replace_record);
        assert_eq!(plan.cleanup, CleanupScope::Workload);
        assert!(!plan.is_full_reload());

        let plan = DeploymentState::ExistsPodCurrent.plan();
        assert!(plan.replace_record);
        assert_eq!(plan.cleanup, CleanupScope::Pod);
        assert!(!plan.is_full_reload());
        assert_eq!(plan.readiness_timeout, Duration::from_secs(40));
    }
}
