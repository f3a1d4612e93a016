// In-memory run scheduler using Tokio tasks
// Runs are not durable across process restarts; a sweeper discards contexts
// of runs that outlive the configured maximum age, and outcomes nobody
// collected within that age.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{panic_message, CancelFlag, RunInput, RunSummary, WorkflowRunner};
use crate::config::RunnerConfig;

/// Final state of a run started by the in-memory runner
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished(RunSummary),
    Failed(String),
}

/// In-memory runner using Tokio tasks
pub struct InMemoryRunner {
    runner: Arc<WorkflowRunner>,
    config: RunnerConfig,
    /// Active runs (run_id -> task handle)
    active_runs: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    /// Cancellation signals (run_id -> cancel flag)
    cancel_signals: Arc<Mutex<HashMap<String, CancelFlag>>>,
    /// Outcomes of ended runs not yet collected by `wait` (run_id -> outcome, ended at)
    outcomes: Arc<Mutex<HashMap<String, (RunOutcome, Instant)>>>,
    /// Signalled whenever a run ends
    finished: Arc<Notify>,
}

impl InMemoryRunner {
    pub fn new(runner: Arc<WorkflowRunner>, config: RunnerConfig) -> Self {
        Self {
            runner,
            config,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
            cancel_signals: Arc::new(Mutex::new(HashMap::new())),
            outcomes: Arc::new(Mutex::new(HashMap::new())),
            finished: Arc::new(Notify::new()),
        }
    }

    /// Start a run in the background
    pub async fn start_run(&self, input: RunInput) -> Result<()> {
        let run_id = input.run_id.clone();
        info!(run_id = %run_id, "Starting in-memory workflow run");

        // Hold the write lock across spawn so the task's cleanup cannot run
        // before its handle is stored
        let mut active_runs = self.active_runs.write().await;
        if active_runs.contains_key(&run_id) {
            anyhow::bail!("Run {run_id} is already running");
        }

        let cancel = CancelFlag::default();
        self.cancel_signals
            .lock()
            .await
            .insert(run_id.clone(), cancel.clone());

        let runner = self.runner.clone();
        let cancel_signals = self.cancel_signals.clone();
        let active = self.active_runs.clone();
        let outcomes = self.outcomes.clone();
        let finished = self.finished.clone();
        let task_run_id = run_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(runner.run(&input, &cancel))
                .catch_unwind()
                .await
            {
                Ok(Ok(summary)) => RunOutcome::Finished(summary),
                Ok(Err(e)) => RunOutcome::Failed(format!("{e:#}")),
                Err(payload) => {
                    let message = panic_message(&*payload).to_string();
                    error!(run_id = %task_run_id, error = %message, "Workflow run panicked");
                    RunOutcome::Failed(format!("Run {task_run_id} panicked: {message}"))
                }
            };

            // Cleanup
            outcomes
                .lock()
                .await
                .insert(task_run_id.clone(), (outcome, Instant::now()));
            cancel_signals.lock().await.remove(&task_run_id);
            active.write().await.remove(&task_run_id);
            finished.notify_waiters();
        });

        active_runs.insert(run_id, handle);
        Ok(())
    }

    /// Ask a run to stop before its next step
    pub async fn cancel(&self, run_id: &str) -> bool {
        info!(run_id = %run_id, "Cancelling in-memory workflow run");
        match self.cancel_signals.lock().await.get(run_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, run_id: &str) -> bool {
        self.active_runs.read().await.contains_key(run_id)
    }

    pub async fn active_count(&self) -> usize {
        self.active_runs.read().await.len()
    }

    /// Outcome of an ended run that has not been collected yet
    pub async fn outcome(&self, run_id: &str) -> Option<RunOutcome> {
        self.outcomes
            .lock()
            .await
            .get(run_id)
            .map(|(outcome, _)| outcome.clone())
    }

    /// Number of outcomes still held
    pub async fn retained_outcomes(&self) -> usize {
        self.outcomes.lock().await.len()
    }

    /// Wait for a run to end and collect its outcome. Returns `None` for a run
    /// that was never started, was aborted by shutdown, or was already collected.
    pub async fn wait(&self, run_id: &str) -> Option<RunOutcome> {
        loop {
            let mut notified = std::pin::pin!(self.finished.notified());
            notified.as_mut().enable();
            if !self.is_running(run_id).await {
                return self
                    .outcomes
                    .lock()
                    .await
                    .remove(run_id)
                    .map(|(outcome, _)| outcome);
            }
            notified.await;
        }
    }

    /// Drop outcomes that ended longer than `max_age` ago
    pub async fn prune_outcomes(&self, max_age: Duration) -> usize {
        prune_outcomes(&self.outcomes, max_age).await
    }

    /// Spawn a task that periodically discards expired run contexts
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        let registry = self.runner.registry().clone();
        let outcomes = self.outcomes.clone();
        let max_age = self.config.max_run_age;
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let expired = registry.discard_expired(max_age).await;
                if !expired.is_empty() {
                    warn!(count = expired.len(), "Discarded expired run contexts");
                }
                let pruned = prune_outcomes(&outcomes, max_age).await;
                if pruned > 0 {
                    info!(count = pruned, "Pruned uncollected run outcomes");
                }
            }
        })
    }

    /// Abort every active run and discard its context
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down in-memory workflow runner");

        let drained: Vec<(String, JoinHandle<()>)> =
            self.active_runs.write().await.drain().collect();

        let mut run_ids = Vec::with_capacity(drained.len());
        let mut handles = Vec::with_capacity(drained.len());
        for (run_id, handle) in drained {
            info!(run_id = %run_id, "Aborting workflow run on shutdown");
            handle.abort();
            run_ids.push(run_id);
            handles.push(handle);
        }
        // Aborted tasks report a cancelled JoinError
        join_all(handles).await;

        for run_id in run_ids {
            self.runner.registry().discard(&run_id).await;
            self.cancel_signals.lock().await.remove(&run_id);
        }

        Ok(())
    }
}

async fn prune_outcomes(
    outcomes: &Mutex<HashMap<String, (RunOutcome, Instant)>>,
    max_age: Duration,
) -> usize {
    let mut outcomes = outcomes.lock().await;
    let before = outcomes.len();
    outcomes.retain(|_, (_, ended_at)| ended_at.elapsed() <= max_age);
    before - outcomes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{StepDefinition, WorkflowDefinition};
    use crate::executor::StepExecutor;
    use crate::runner::RunStatus;
    use async_trait::async_trait;
    use runbind_core::memory::{InMemoryCredentialStore, InMemoryExternalSecretStore};
    use runbind_core::{Organization, ResolverConfig, RunContext, RunContextRegistry};
    use serde_json::{json, Value};

    /// Blocks every step until released
    #[derive(Default)]
    struct GatedExecutor {
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl StepExecutor for GatedExecutor {
        async fn execute(&self, _step: &StepDefinition, _context: &RunContext) -> Result<Value> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(json!({"status": "completed"}))
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl StepExecutor for PanickingExecutor {
        async fn execute(&self, step: &StepDefinition, _context: &RunContext) -> Result<Value> {
            panic!("executor crashed on {}", step.label);
        }
    }

    fn runner_with(executor: Arc<dyn StepExecutor>) -> InMemoryRunner {
        let registry = RunContextRegistry::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryExternalSecretStore::new()),
            ResolverConfig::default(),
        );
        InMemoryRunner::new(
            Arc::new(WorkflowRunner::new(Arc::new(registry), executor)),
            RunnerConfig::default(),
        )
    }

    fn input(run_id: &str, steps: usize) -> RunInput {
        RunInput {
            run_id: run_id.to_string(),
            organization: Organization::new("o_1"),
            definition: Arc::new(WorkflowDefinition {
                steps: (0..steps)
                    .map(|i| StepDefinition::new(format!("step{i}")))
                    .collect(),
                ..Default::default()
            }),
            inputs: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let executor = Arc::new(GatedExecutor::default());
        let runner = runner_with(executor.clone());

        runner.start_run(input("wr_1", 3)).await.unwrap();
        assert!(runner.is_running("wr_1").await);
        executor.entered.notified().await;
        assert!(runner.cancel("wr_1").await);
        executor.gate.notify_one();

        let outcome = runner.wait("wr_1").await.unwrap();
        let RunOutcome::Finished(summary) = outcome else {
            panic!("run failed: {outcome:?}");
        };
        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.steps_completed, 1);
        assert!(!runner.is_running("wr_1").await);
        assert!(runner.runner.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_and_discards() {
        let runner = runner_with(Arc::new(GatedExecutor::default()));

        runner.start_run(input("wr_1", 1)).await.unwrap();
        runner.start_run(input("wr_2", 1)).await.unwrap();
        while runner.runner.registry().len().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runner.active_count().await, 2);

        runner.shutdown().await.unwrap();

        assert_eq!(runner.active_count().await, 0);
        assert!(runner.runner.registry().is_empty().await);
        assert!(!runner.cancel("wr_1").await);
    }

    #[tokio::test]
    async fn test_duplicate_start_rejected() {
        let executor = Arc::new(GatedExecutor::default());
        let runner = runner_with(executor.clone());

        runner.start_run(input("wr_1", 1)).await.unwrap();
        assert!(runner.start_run(input("wr_1", 1)).await.is_err());

        executor.gate.notify_one();
        assert!(matches!(
            runner.wait("wr_1").await,
            Some(RunOutcome::Finished(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_executor_fails_run() {
        let runner = runner_with(Arc::new(PanickingExecutor));

        runner.start_run(input("wr_p", 2)).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), runner.wait("wr_p"))
            .await
            .unwrap();

        let Some(RunOutcome::Failed(message)) = outcome else {
            panic!("expected failed outcome, got {outcome:?}");
        };
        assert!(message.contains("executor crashed on step0"));
        assert!(!runner.is_running("wr_p").await);
        assert!(!runner.cancel("wr_p").await);
        assert!(runner.runner.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_collected_outcomes_are_released() {
        let runner = runner_with(Arc::new(crate::executor::EchoExecutor));

        for i in 0..50 {
            let run_id = format!("wr_{i}");
            runner.start_run(input(&run_id, 1)).await.unwrap();
            assert!(matches!(
                runner.wait(&run_id).await,
                Some(RunOutcome::Finished(_))
            ));
        }

        assert_eq!(runner.active_count().await, 0);
        assert_eq!(runner.retained_outcomes().await, 0);
        assert!(runner.wait("wr_0").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncollected_outcomes_are_pruned() {
        let runner = runner_with(Arc::new(crate::executor::EchoExecutor));

        runner.start_run(input("wr_1", 1)).await.unwrap();
        while runner.is_running("wr_1").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(runner.outcome("wr_1").await.is_some());

        assert_eq!(runner.prune_outcomes(Duration::from_secs(60)).await, 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(runner.prune_outcomes(Duration::from_secs(60)).await, 1);
        assert_eq!(runner.retained_outcomes().await, 0);
    }
}
