use serde::Serialize;
use serde_json::{json, Value};

use super::planner::ReconciliationPlan;
use crate::error::{InventoryError, ProviderError, RotationError};
use crate::keys::{DeployKey, KeyOrigin};

/// key: rotation-phase
/// Executor state for one repository. `Failed` is absorbing.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    PendingDelete,
    Deleting,
    PendingCreate,
    Creating,
    Done,
    Failed,
}

impl RotationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPhase::PendingDelete => "pending_delete",
            RotationPhase::Deleting => "deleting",
            RotationPhase::PendingCreate => "pending_create",
            RotationPhase::Creating => "creating",
            RotationPhase::Done => "done",
            RotationPhase::Failed => "failed",
        }
    }

    /// `PendingCreate -> Done` is the path taken when the plan keeps an existing key.
    pub fn can_advance_to(&self, next: RotationPhase) -> bool {
        use RotationPhase::*;
        matches!(
            (self, next),
            (PendingDelete, Deleting)
                | (Deleting, PendingCreate)
                | (Deleting, Failed)
                | (PendingCreate, Creating)
                | (PendingCreate, Done)
                | (Creating, Done)
                | (Creating, Failed)
        )
    }
}

/// key: rotation-status
/// Terminal classification of a repository run.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    /// Stale keys removed and a new key issued.
    Rotated,
    /// An existing key pair was kept; any stale keys were removed.
    Retained,
    /// The run finished but at least one deletion was rejected.
    Degraded,
    /// Dry run: the plan was computed and nothing was changed.
    Planned,
    /// The inventory could not be read; nothing was changed.
    Unreachable,
    Failed,
}

impl RotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStatus::Rotated => "rotated",
            RotationStatus::Retained => "retained",
            RotationStatus::Degraded => "degraded",
            RotationStatus::Planned => "planned",
            RotationStatus::Unreachable => "unreachable",
            RotationStatus::Failed => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RotationStatus::Failed | RotationStatus::Unreachable)
    }
}

#[derive(Debug)]
pub struct DeletionFailure {
    pub origin: KeyOrigin,
    pub identifier: String,
    pub error: ProviderError,
}

/// key: rotation-outcome
/// Everything that happened to one repository during a run.
#[derive(Debug)]
pub struct RotationOutcome {
    pub repository: String,
    pub status: RotationStatus,
    pub phase: RotationPhase,
    pub plan: Option<ReconciliationPlan>,
    pub deleted_on_host: Vec<String>,
    pub deleted_on_ci: Vec<String>,
    pub failed_deletions: Vec<DeletionFailure>,
    pub created_key: Option<DeployKey>,
    pub error: Option<RotationError>,
}

impl RotationOutcome {
    pub(crate) fn pending(
        repository: impl Into<String>,
        plan: Option<ReconciliationPlan>,
    ) -> Self {
        Self {
            repository: repository.into(),
            status: RotationStatus::Planned,
            phase: RotationPhase::PendingDelete,
            plan,
            deleted_on_host: Vec::new(),
            deleted_on_ci: Vec::new(),
            failed_deletions: Vec::new(),
            created_key: None,
            error: None,
        }
    }

    pub fn unreachable(repository: impl Into<String>, error: InventoryError) -> Self {
        let mut outcome = Self::pending(repository, None);
        outcome.status = RotationStatus::Unreachable;
        outcome.error = Some(RotationError::ProviderUnreachable(error));
        outcome
    }

    pub fn aborted(repository: impl Into<String>, reason: impl Into<String>) -> Self {
        let repository = repository.into();
        let mut outcome = Self::pending(repository.clone(), None);
        outcome.status = RotationStatus::Failed;
        outcome.phase = RotationPhase::Failed;
        outcome.error = Some(RotationError::TaskAborted {
            repository,
            reason: reason.into(),
        });
        outcome
    }

    pub(crate) fn advance(&mut self, next: RotationPhase) -> Result<(), RotationError> {
        if !self.phase.can_advance_to(next) {
            return Err(RotationError::IllegalTransition {
                from: self.phase.as_str(),
                to: next.as_str(),
            });
        }
        self.phase = next;
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: RotationError) {
        self.phase = RotationPhase::Failed;
        self.status = RotationStatus::Failed;
        self.error = Some(error);
    }

    pub(crate) fn record_deletion(
        &mut self,
        origin: KeyOrigin,
        identifier: String,
        result: Result<(), ProviderError>,
    ) {
        match (result, origin) {
            (Ok(()), KeyOrigin::Host) => self.deleted_on_host.push(identifier),
            (Ok(()), KeyOrigin::Ci) => self.deleted_on_ci.push(identifier),
            (Err(error), origin) => self.failed_deletions.push(DeletionFailure {
                origin,
                identifier,
                error,
            }),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    pub fn created_identifier(&self) -> Option<&str> {
        self.created_key.as_ref().map(|key| key.identifier.as_str())
    }

    /// One structured line per repository for the run report.
    pub fn summary(&self) -> Value {
        let failed_deletions: Vec<Value> = self
            .failed_deletions
            .iter()
            .map(|failure| {
                json!({
                    "origin": failure.origin,
                    "identifier": failure.identifier,
                    "error": failure.error.to_string(),
                })
            })
            .collect();

        let mut summary = json!({
            "repository": self.repository,
            "status": self.status,
            "phase": self.phase,
            "deleted": {
                "host": self.deleted_on_host,
                "ci": self.deleted_on_ci,
            },
            "created": self.created_identifier(),
        });
        if !failed_deletions.is_empty() {
            summary["failed_deletions"] = Value::Array(failed_deletions);
        }
        if let Some(plan) = &self.plan {
            if self.status == RotationStatus::Planned {
                summary["plan"] = json!(plan);
            }
        }
        if let Some(error) = &self.error {
            summary["error"] = json!(error.to_string());
        }
        summary
    }
}

/// Totals across every repository of a run.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories: usize,
    pub rotated: usize,
    pub retained: usize,
    pub degraded: usize,
    pub planned: usize,
    pub unreachable: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[RotationOutcome]) -> Self {
        let mut summary = RunSummary {
            repositories: outcomes.len(),
            ..RunSummary::default()
        };
        for outcome in outcomes {
            match outcome.status {
                RotationStatus::Rotated => summary.rotated += 1,
                RotationStatus::Retained => summary.retained += 1,
                RotationStatus::Degraded => summary.degraded += 1,
                RotationStatus::Planned => summary.planned += 1,
                RotationStatus::Unreachable => summary.unreachable += 1,
                RotationStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.unreachable == 0 && self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_follow_delete_then_create_order() {
        let mut outcome = RotationOutcome::pending("api", None);
        outcome.advance(RotationPhase::Deleting).unwrap();
        outcome.advance(RotationPhase::PendingCreate).unwrap();
        outcome.advance(RotationPhase::Creating).unwrap();
        outcome.advance(RotationPhase::Done).unwrap();
        assert_eq!(outcome.phase, RotationPhase::Done);
    }

    #[test]
    fn creation_cannot_start_before_deletion() {
        let mut outcome = RotationOutcome::pending("api", None);
        let err = outcome.advance(RotationPhase::Creating).unwrap_err();
        assert!(matches!(
            err,
            RotationError::IllegalTransition {
                from: "pending_delete",
                to: "creating"
            }
        ));
        assert_eq!(outcome.phase, RotationPhase::PendingDelete);
    }

    #[test]
    fn failed_is_absorbing() {
        for next in [
            RotationPhase::PendingDelete,
            RotationPhase::Deleting,
            RotationPhase::PendingCreate,
            RotationPhase::Creating,
            RotationPhase::Done,
        ] {
            assert!(!RotationPhase::Failed.can_advance_to(next));
        }
    }

    #[test]
    fn summary_reports_failures_and_totals() {
        let mut degraded = RotationOutcome::pending("api", None);
        degraded.status = RotationStatus::Degraded;
        degraded.record_deletion(KeyOrigin::Ci, "f1".into(), Ok(()));
        degraded.record_deletion(
            KeyOrigin::Host,
            "h1".into(),
            Err(ProviderError::Timeout {
                provider: KeyOrigin::Host,
            }),
        );

        let line = degraded.summary();
        assert_eq!(line["status"], "degraded");
        assert_eq!(line["deleted"]["ci"][0], "f1");
        assert_eq!(line["failed_deletions"][0]["origin"], "host");
        assert_eq!(line["failed_deletions"][0]["identifier"], "h1");

        let aborted = RotationOutcome::aborted("web", "panicked");
        let totals = RunSummary::from_outcomes(&[degraded, aborted]);
        assert_eq!(totals.degraded, 1);
        assert_eq!(totals.failed, 1);
        assert!(!totals.is_success());
    }
}
