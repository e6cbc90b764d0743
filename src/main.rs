use std::process::ExitCode;

use deploy_key_rotation::{scheduler_from_config, RotationConfig, RunSummary};
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    // Everything below reads from this struct; the environment is not consulted again.
    let config = match RotationConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration rejected; no repository was processed");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let scheduler = match scheduler_from_config(&config) {
        Ok(scheduler) => scheduler,
        Err(err) => {
            error!(error = ?err, "failed to build provider clients");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let run_id = Uuid::new_v4();
    let span = info_span!("rotation_run", %run_id, organization = %config.organization);
    info!(
        parent: &span,
        repositories = config.repositories.len(),
        policy = config.policy.as_str(),
        dry_run = config.dry_run,
        max_concurrency = config.max_concurrency,
        "starting deploy key rotation"
    );

    let outcomes = tokio::select! {
        outcomes = scheduler.run(config.targets()).instrument(span.clone()) => outcomes,
        Ok(()) = tokio::signal::ctrl_c() => {
            error!(
                parent: &span,
                "interrupted: in-flight rotations were cancelled; deletions already issued are \
                 not rolled back, so some repositories may be left without a checkout key"
            );
            return ExitCode::from(EXIT_INTERRUPTED);
        }
    };

    for outcome in &outcomes {
        println!("{}", outcome.summary());
    }

    let summary = RunSummary::from_outcomes(&outcomes);
    info!(
        parent: &span,
        repositories = summary.repositories,
        rotated = summary.rotated,
        retained = summary.retained,
        degraded = summary.degraded,
        planned = summary.planned,
        unreachable = summary.unreachable,
        failed = summary.failed,
        "deploy key rotation finished"
    );

    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
