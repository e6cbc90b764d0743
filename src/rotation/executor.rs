use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use super::outcome::{RotationOutcome, RotationPhase, RotationStatus};
use super::planner::ReconciliationPlan;
use crate::error::RotationError;
use crate::keys::RepositoryTarget;
use crate::providers::{KeyIssuer, KeyProvider};

/// key: rotation-executor
/// Applies a plan: every deletion first, concurrently, then at most one creation.
///
/// Deletions are isolated from each other; a rejected deletion is recorded and the run
/// continues. A failed creation fails the repository even when every deletion
/// succeeded. Nothing is retried here.
#[derive(Clone)]
pub struct RotationExecutor {
    host: Arc<dyn KeyProvider>,
    ci: Arc<dyn KeyIssuer>,
    dry_run: bool,
}

impl RotationExecutor {
    pub fn new(host: Arc<dyn KeyProvider>, ci: Arc<dyn KeyIssuer>) -> Self {
        Self {
            host,
            ci,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn execute(
        &self,
        target: &RepositoryTarget,
        plan: ReconciliationPlan,
    ) -> RotationOutcome {
        let mut outcome = RotationOutcome::pending(&target.name, Some(plan.clone()));
        if self.dry_run {
            info!(
                repository = %target.name,
                deletions = plan.deletion_count(),
                delete_on_ci = ?plan.keys_to_delete_on_ci,
                delete_on_host = ?plan.keys_to_delete_on_host,
                create = plan.should_create_new_key,
                "dry run: rotation plan computed, no changes made"
            );
            return outcome;
        }

        if let Err(err) = self.apply(target, &plan, &mut outcome).await {
            error!(
                repository = %target.name,
                error = %err,
                deleted_on_ci = ?outcome.deleted_on_ci,
                deleted_on_host = ?outcome.deleted_on_host,
                "key rotation failed"
            );
            outcome.fail(err);
        }
        outcome
    }

    async fn apply(
        &self,
        target: &RepositoryTarget,
        plan: &ReconciliationPlan,
        outcome: &mut RotationOutcome,
    ) -> Result<(), RotationError> {
        outcome.advance(RotationPhase::Deleting)?;

        let ci_deletions = plan.keys_to_delete_on_ci.iter().map(|identifier| async move {
            (identifier, self.ci.delete_key(target, identifier).await)
        });
        let host_deletions = plan.keys_to_delete_on_host.iter().map(|identifier| async move {
            (identifier, self.host.delete_key(target, identifier).await)
        });
        let (ci_results, host_results) =
            tokio::join!(join_all(ci_deletions), join_all(host_deletions));

        let (ci_origin, host_origin) = (self.ci.origin(), self.host.origin());
        let settled = ci_results
            .into_iter()
            .map(|(identifier, result)| (ci_origin, identifier, result))
            .chain(
                host_results
                    .into_iter()
                    .map(|(identifier, result)| (host_origin, identifier, result)),
            );
        for (origin, identifier, result) in settled {
            match &result {
                Ok(()) => info!(repository = %target.name, %origin, %identifier, "key deleted"),
                Err(err) => warn!(
                    repository = %target.name,
                    %origin,
                    %identifier,
                    error = %err,
                    "key deletion failed; continuing"
                ),
            }
            outcome.record_deletion(origin, identifier.clone(), result);
        }

        outcome.advance(RotationPhase::PendingCreate)?;
        let degraded = !outcome.failed_deletions.is_empty();

        if !plan.should_create_new_key {
            outcome.advance(RotationPhase::Done)?;
            outcome.status = if degraded {
                RotationStatus::Degraded
            } else {
                RotationStatus::Retained
            };
            info!(
                repository = %target.name,
                retained = ?plan.retained,
                "existing key pair retained"
            );
            return Ok(());
        }

        outcome.advance(RotationPhase::Creating)?;
        let created = self
            .ci
            .issue_key(target)
            .await
            .map_err(|source| RotationError::CreationFailed { source })?;

        info!(
            repository = %target.name,
            identifier = %created.identifier,
            fingerprint = created.sha256_fingerprint().as_deref().unwrap_or("unknown"),
            "checkout key created"
        );
        outcome.created_key = Some(created);
        outcome.advance(RotationPhase::Done)?;
        outcome.status = if degraded {
            RotationStatus::Degraded
        } else {
            RotationStatus::Rotated
        };
        Ok(())
    }
}
