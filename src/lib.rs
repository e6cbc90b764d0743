pub mod config;
pub mod error;
pub mod keys;
pub mod providers;
pub mod rotation;

use std::sync::Arc;

use anyhow::Result;

pub use config::RotationConfig;
pub use error::{ConfigError, InventoryError, ProviderError, RotationError};
pub use keys::{DeployKey, KeyOrigin, KeyRole, RepositoryTarget};
pub use rotation::{
    ReconciliationPlan, ReconciliationPlanner, RepositoryScheduler, RotationExecutor,
    RotationOutcome, RotationPipeline, RotationPolicy, RotationStatus, RunSummary,
};

use providers::{CircleCiClient, GitHubClient};

/// Wire the GitHub and CircleCI clients described by `config` into a scheduler.
pub fn scheduler_from_config(config: &RotationConfig) -> Result<RepositoryScheduler> {
    let host = GitHubClient::new(
        config.github_repos_url(),
        config.github_token.clone(),
        config.request_timeout,
    )?;
    let ci = CircleCiClient::new(
        config.circleci_project_url(),
        config.circleci_token.clone(),
        config.request_timeout,
    )?;
    let pipeline =
        RotationPipeline::new(Arc::new(host), Arc::new(ci), config.policy, config.dry_run);
    Ok(RepositoryScheduler::new(pipeline, config.max_concurrency))
}
