//! Core types for lifecycle operations.
//!
//! - `OperationId`: unique identifier for an operation
//! - `OperationKind`: what the operation does
//! - `OperationState`: where the operation is in its state machine
//! - `BundleSpec`: a bundle to be created
//! - `OperationReport`: the outcome returned to callers

use chrono::{DateTime, Utc};
use keyturn_store::{BundleName, BundleType, SecretKeys};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::workload::Tier;

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Creates a new random operation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a set of bundles from specs
    Create,
    /// Replace values and propagate to dependents
    Rotate,
    /// Replace values, optionally propagating
    Update,
    /// Remove bundles
    Delete,
    /// Re-run restart propagation for an existing bundle
    Restart,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Rotate => "rotate",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Restart => "restart",
        };
        write!(f, "{s}")
    }
}

/// State of a lifecycle operation.
///
/// `Pending -> Applying -> Verifying -> Complete`, with `Failed` reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Not yet started
    Pending,
    /// Writing to the store
    Applying,
    /// Propagating and checking the change
    Verifying,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Failed,
}

impl OperationState {
    /// Returns true if the operation is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Applying)
                | (Self::Applying, Self::Verifying)
                | (Self::Verifying, Self::Complete)
                | (Self::Pending | Self::Applying | Self::Verifying, Self::Failed)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A bundle to be created by `create_all`.
#[derive(Debug, Clone)]
pub struct BundleSpec {
    /// Bundle name
    pub name: BundleName,
    /// Bundle type
    pub bundle_type: BundleType,
    /// Initial keys
    pub keys: SecretKeys,
}

impl BundleSpec {
    /// Creates an opaque bundle spec.
    #[must_use]
    pub fn new(name: BundleName, keys: SecretKeys) -> Self {
        Self {
            name,
            bundle_type: BundleType::Opaque,
            keys,
        }
    }

    /// Sets the bundle type.
    #[must_use]
    pub const fn with_type(mut self, bundle_type: BundleType) -> Self {
        self.bundle_type = bundle_type;
        self
    }
}

/// One input to `create_all`.
///
/// A caller that reads many bundles from a manifest can pass entries it
/// already rejected; they are reported as failed in input order next to
/// the specs that were attempted.
#[derive(Debug, Clone)]
pub enum CreateEntry {
    /// A valid bundle to create
    Spec(BundleSpec),
    /// An entry rejected before reaching the store
    Rejected {
        /// Name as given by the caller
        name: String,
        /// Why the entry was rejected
        error: String,
    },
}

impl CreateEntry {
    /// Creates a rejected entry.
    #[must_use]
    pub fn rejected(name: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::Rejected {
            name: name.into(),
            error: error.to_string(),
        }
    }

    /// Returns the entry's name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Spec(spec) => spec.name.as_str(),
            Self::Rejected { name, .. } => name,
        }
    }
}

impl From<BundleSpec> for CreateEntry {
    fn from(spec: BundleSpec) -> Self {
        Self::Spec(spec)
    }
}

/// What happened to one bundle during an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleStatus {
    /// A new version was written
    Applied {
        /// Version before the write, if the bundle existed
        previous_version: Option<u64>,
        /// Version written
        version: u64,
    },
    /// The bundle was removed (or was already absent)
    Deleted,
    /// The bundle could not be processed
    Failed {
        /// Failure description
        error: String,
    },
    /// The bundle was not attempted
    Skipped,
}

/// Per-bundle outcome.
///
/// The name is kept as given so entries rejected before validation can
/// still be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOutcome {
    /// Bundle name
    pub bundle: String,
    /// What happened
    #[serde(flatten)]
    pub status: BundleStatus,
}

/// What happened to one workload during restart propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestartStatus {
    /// Restarted and reported ready
    Ready,
    /// Restarted but not ready before the deadline
    TimedOut,
    /// The restart or readiness query failed
    Failed {
        /// Failure description
        error: String,
    },
    /// Not restarted because an earlier tier failed
    Skipped,
}

/// Per-workload restart outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartOutcome {
    /// Workload name
    pub workload: String,
    /// Tier the workload belongs to
    pub tier: Tier,
    /// What happened
    #[serde(flatten)]
    pub status: RestartStatus,
}

impl RestartOutcome {
    /// Returns true unless the restart failed or timed out.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self.status,
            RestartStatus::TimedOut | RestartStatus::Failed { .. }
        )
    }
}

/// The outcome of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    /// Operation identifier
    pub id: OperationId,
    /// Operation kind
    pub kind: OperationKind,
    /// Current (terminal, once returned) state
    pub state: OperationState,
    /// Stage the operation was in when it failed
    pub failed_stage: Option<OperationState>,
    /// First error encountered
    pub error: Option<String>,
    /// Per-bundle outcomes, in input order
    pub bundles: Vec<BundleOutcome>,
    /// Per-workload restart outcomes, in restart order
    pub restarts: Vec<RestartOutcome>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
    /// When the operation started
    pub started_at: DateTime<Utc>,
    /// When the operation reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl OperationReport {
    /// Creates a pending report.
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            state: OperationState::Pending,
            failed_stage: None,
            error: None,
            bundles: Vec::new(),
            restarts: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] if `next` is not a legal
    /// successor of the current state.
    pub fn transition(&mut self, next: OperationState) -> LifecycleResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::invalid_transition(self.state, next));
        }
        debug!(operation = %self.id, kind = %self.kind, from = %self.state, to = %next, "operation state change");
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Marks the operation failed at its current stage.
    ///
    /// Only the first error is kept. Has no effect on a terminal report.
    pub fn fail(&mut self, error: &LifecycleError) {
        if self.state.is_terminal() {
            return;
        }
        self.failed_stage = Some(self.state);
        self.error = Some(error.to_string());
        self.state = OperationState::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Records a bundle outcome.
    pub fn record_bundle(&mut self, bundle: impl Into<String>, status: BundleStatus) {
        self.bundles.push(BundleOutcome {
            bundle: bundle.into(),
            status,
        });
    }

    /// Records a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns true if the operation completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == OperationState::Complete
    }

    /// Names of bundles that were applied or deleted.
    #[must_use]
    pub fn succeeded(&self) -> Vec<&str> {
        self.bundles_where(|s| matches!(s, BundleStatus::Applied { .. } | BundleStatus::Deleted))
    }

    /// Names of bundles that failed.
    #[must_use]
    pub fn failed(&self) -> Vec<&str> {
        self.bundles_where(|s| matches!(s, BundleStatus::Failed { .. }))
    }

    /// Names of bundles that were never attempted.
    #[must_use]
    pub fn skipped(&self) -> Vec<&str> {
        self.bundles_where(|s| matches!(s, BundleStatus::Skipped))
    }

    fn bundles_where(&self, pred: impl Fn(&BundleStatus) -> bool) -> Vec<&str> {
        self.bundles
            .iter()
            .filter(|o| pred(&o.status))
            .map(|o| o.bundle.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod operation_state {
        use super::*;
        use test_case::test_case;

        #[test_case(OperationState::Pending, OperationState::Applying, true)]
        #[test_case(OperationState::Applying, OperationState::Verifying, true)]
        #[test_case(OperationState::Verifying, OperationState::Complete, true)]
        #[test_case(OperationState::Applying, OperationState::Failed, true)]
        #[test_case(OperationState::Verifying, OperationState::Failed, true)]
        #[test_case(OperationState::Pending, OperationState::Complete, false)]
        #[test_case(OperationState::Applying, OperationState::Complete, false)]
        #[test_case(OperationState::Complete, OperationState::Failed, false)]
        #[test_case(OperationState::Failed, OperationState::Applying, false)]
        #[test_case(OperationState::Verifying, OperationState::Applying, false)]
        fn transitions(from: OperationState, to: OperationState, legal: bool) {
            assert_eq!(from.can_transition_to(to), legal);
        }

        #[test]
        fn terminal_states() {
            assert!(OperationState::Complete.is_terminal());
            assert!(OperationState::Failed.is_terminal());
            assert!(!OperationState::Pending.is_terminal());
            assert!(!OperationState::Applying.is_terminal());
            assert!(!OperationState::Verifying.is_terminal());
        }

        #[test]
        fn display_and_serde_agree() {
            for state in [
                OperationState::Pending,
                OperationState::Applying,
                OperationState::Verifying,
                OperationState::Complete,
                OperationState::Failed,
            ] {
                let json = serde_json::to_string(&state).expect("serialize");
                assert_eq!(json, format!("\"{state}\""));
            }
        }
    }

    mod operation_report {
        use super::*;

        fn name(s: &str) -> BundleName {
            BundleName::new(s).expect("valid name")
        }

        #[test]
        fn new_report_is_pending() {
            let report = OperationReport::new(OperationKind::Rotate);
            assert_eq!(report.state, OperationState::Pending);
            assert!(report.finished_at.is_none());
            assert!(!report.is_success());
        }

        #[test]
        fn full_happy_path() {
            let mut report = OperationReport::new(OperationKind::Create);
            report.transition(OperationState::Applying).expect("applying");
            report.transition(OperationState::Verifying).expect("verifying");
            report.transition(OperationState::Complete).expect("complete");
            assert!(report.is_success());
            assert!(report.finished_at.is_some());
        }

        #[test]
        fn illegal_transition_is_rejected() {
            let mut report = OperationReport::new(OperationKind::Create);
            let err = report
                .transition(OperationState::Complete)
                .expect_err("pending cannot complete");
            assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
            assert_eq!(report.state, OperationState::Pending);
        }

        #[test]
        fn fail_records_stage_and_first_error() {
            let mut report = OperationReport::new(OperationKind::Rotate);
            report.transition(OperationState::Applying).expect("applying");
            report.transition(OperationState::Verifying).expect("verifying");
            report.fail(&LifecycleError::RolloutTimeout {
                workload: "postgres".to_string(),
                timeout_secs: 300,
            });
            report.fail(&LifecycleError::Audit("ignored".to_string()));

            assert_eq!(report.state, OperationState::Failed);
            assert_eq!(report.failed_stage, Some(OperationState::Verifying));
            assert!(report.error.as_deref().is_some_and(|e| e.contains("postgres")));
        }

        #[test]
        fn partitions_bundles_by_status() {
            let mut report = OperationReport::new(OperationKind::Create);
            report.record_bundle(
                name("spec1"),
                BundleStatus::Applied {
                    previous_version: None,
                    version: 1,
                },
            );
            report.record_bundle(
                name("spec2"),
                BundleStatus::Failed {
                    error: "bad".to_string(),
                },
            );
            report.record_bundle(name("spec3"), BundleStatus::Skipped);

            assert_eq!(report.succeeded(), vec!["spec1"]);
            assert_eq!(report.failed(), vec!["spec2"]);
            assert_eq!(report.skipped(), vec!["spec3"]);
        }

        #[test]
        fn report_serializes_flat_outcomes() {
            let mut report = OperationReport::new(OperationKind::Delete);
            report.record_bundle(name("db"), BundleStatus::Deleted);
            let json = serde_json::to_value(&report).expect("serialize");
            assert_eq!(json["kind"], "delete");
            assert_eq!(json["bundles"][0]["bundle"], "db");
            assert_eq!(json["bundles"][0]["status"], "deleted");
        }
    }
}
