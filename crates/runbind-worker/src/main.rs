use std::sync::Arc;

use anyhow::{Context, Result};
use runbind_core::RunContextRegistry;
use runbind_worker::{
    EchoExecutor, InMemoryRunner, Manifest, RunInput, RunOutcome, RunnerConfig, WorkflowRunner,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runbind_worker=debug,runbind_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args()
        .nth(1)
        .context("Usage: runbind-worker <manifest.json>")?;

    let config = RunnerConfig::from_env()?;
    tracing::info!(
        max_run_age_secs = config.max_run_age.as_secs(),
        fetch_timeout = ?config.resolver.fetch_timeout,
        "Runner configured"
    );

    let manifest = Manifest::load(&path).await?;
    let (credentials, secrets) = manifest.seed_stores().await;

    let registry = Arc::new(RunContextRegistry::new(
        Arc::new(credentials),
        Arc::new(secrets),
        config.resolver.clone(),
    ));
    let runner = Arc::new(WorkflowRunner::new(registry, Arc::new(EchoExecutor)));
    let scheduler = InMemoryRunner::new(runner, config);
    let sweeper = scheduler.start_sweeper();

    let run_id = manifest
        .run_id
        .clone()
        .unwrap_or_else(|| format!("wr_{}", Uuid::now_v7()));
    scheduler
        .start_run(RunInput {
            run_id: run_id.clone(),
            organization: manifest.organization,
            definition: Arc::new(manifest.workflow),
            inputs: manifest.inputs,
        })
        .await?;

    let outcome = tokio::select! {
        outcome = scheduler.wait(&run_id) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(run_id = %run_id, "Interrupted, shutting down");
            scheduler.shutdown().await?;
            None
        }
    };
    sweeper.abort();

    match outcome {
        Some(RunOutcome::Finished(summary)) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Some(RunOutcome::Failed(error)) => anyhow::bail!("Run {run_id} failed: {error}"),
        None => anyhow::bail!("Run {run_id} did not finish"),
    }
}
