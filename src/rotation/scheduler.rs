use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use super::executor::RotationExecutor;
use super::inventory::KeyInventory;
use super::outcome::RotationOutcome;
use super::planner::{ReconciliationPlanner, RotationPolicy};
use crate::keys::RepositoryTarget;
use crate::providers::{KeyIssuer, KeyProvider};

/// key: rotation-pipeline
/// Inventory, plan and execute for a single repository.
pub struct RotationPipeline {
    inventory: KeyInventory,
    planner: ReconciliationPlanner,
    executor: RotationExecutor,
}

impl RotationPipeline {
    pub fn new(
        host: Arc<dyn KeyProvider>,
        ci: Arc<dyn KeyIssuer>,
        policy: RotationPolicy,
        dry_run: bool,
    ) -> Self {
        Self {
            inventory: KeyInventory::new(Arc::clone(&host), Arc::clone(&ci)),
            planner: ReconciliationPlanner::new(policy),
            executor: RotationExecutor::new(host, ci).with_dry_run(dry_run),
        }
    }

    pub async fn rotate(&self, target: &RepositoryTarget) -> RotationOutcome {
        let snapshot = match self.inventory.fetch(target).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    repository = %target.name,
                    providers = ?err.failed_providers(),
                    error = %err,
                    "key inventory unavailable; repository skipped"
                );
                return RotationOutcome::unreachable(&target.name, err);
            }
        };

        let plan = self.planner.plan(&snapshot.host_keys, &snapshot.ci_keys);
        info!(
            repository = %target.name,
            policy = self.planner.policy().as_str(),
            delete_on_ci = plan.keys_to_delete_on_ci.len(),
            delete_on_host = plan.keys_to_delete_on_host.len(),
            create = plan.should_create_new_key,
            "rotation planned"
        );
        self.executor.execute(target, plan).await
    }
}

/// key: repository-scheduler
/// Runs one pipeline task per repository and waits for all of them.
///
/// Tasks share no mutable state. A failing or panicking repository never cancels its
/// siblings, and outcomes come back in the order the targets were given. Dropping the
/// `run` future aborts every task still in flight; deletions already issued stay issued.
pub struct RepositoryScheduler {
    pipeline: Arc<RotationPipeline>,
    max_concurrency: usize,
}

impl RepositoryScheduler {
    pub fn new(pipeline: RotationPipeline, max_concurrency: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            max_concurrency: max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    pub async fn run(&self, targets: Vec<RepositoryTarget>) -> Vec<RotationOutcome> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&permits);
            let span = info_span!("rotate_repository", repository = %target.name);
            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    (index, pipeline.rotate(&target).await)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<RotationOutcome>> = targets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => error!(error = %err, "repository rotation task did not complete"),
            }
        }

        targets
            .into_iter()
            .zip(slots)
            .map(|(target, slot)| {
                slot.unwrap_or_else(|| {
                    RotationOutcome::aborted(
                        &target.name,
                        "task panicked before producing an outcome",
                    )
                })
            })
            .collect()
    }
}
