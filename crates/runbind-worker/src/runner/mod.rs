// Decision: WorkflowRunner drives one run end to end against the shared
// RunContextRegistry: create the context, then for each step register its
// parameters, execute it and record its output.
// Decision: A run's context is discarded however the run ends (completion,
// failure, cancellation or a panicking executor); only a context this run
// created is discarded.

pub mod inmemory;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use runbind_core::{Organization, RunContextRegistry, SharedRunContext};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::definition::{RunInputs, WorkflowDefinition};
use crate::executor::StepExecutor;

/// Cancellation flag checked between steps
pub type CancelFlag = Arc<AtomicBool>;

/// Input for starting a run
#[derive(Debug, Clone)]
pub struct RunInput {
    pub run_id: String,
    pub organization: Organization,
    pub definition: Arc<WorkflowDefinition>,
    pub inputs: RunInputs,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub steps_completed: usize,
    /// Step outputs by output parameter key
    pub outputs: Map<String, Value>,
}

/// Drives workflow runs through the parameter engine
pub struct WorkflowRunner {
    registry: Arc<RunContextRegistry>,
    executor: Arc<dyn StepExecutor>,
}

impl WorkflowRunner {
    pub fn new(registry: Arc<RunContextRegistry>, executor: Arc<dyn StepExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<RunContextRegistry> {
        &self.registry
    }

    /// Execute a run to completion, failure or cancellation
    pub async fn run(&self, input: &RunInput, cancel: &CancelFlag) -> Result<RunSummary> {
        let declarations = input.definition.declarations(&input.inputs)?;

        info!(
            run_id = %input.run_id,
            organization_id = %input.organization.organization_id,
            steps = input.definition.steps.len(),
            "Starting workflow run"
        );

        let context = match self
            .registry
            .create(&input.run_id, input.organization.clone(), declarations)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                if e.is_definition_error() {
                    error!(run_id = %input.run_id, error = %e, "Workflow definition rejected");
                }
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to initialize run {}", input.run_id)));
            }
        };

        let result = match AssertUnwindSafe(self.execute_steps(input, &context, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "Run {} panicked: {}",
                input.run_id,
                panic_message(&*payload)
            )),
        };
        self.registry.discard(&input.run_id).await;

        match &result {
            Ok(summary) => info!(
                run_id = %input.run_id,
                status = ?summary.status,
                steps_completed = summary.steps_completed,
                "Workflow run finished"
            ),
            Err(e) => error!(run_id = %input.run_id, error = %e, "Workflow run failed"),
        }
        result
    }

    async fn execute_steps(
        &self,
        input: &RunInput,
        context: &SharedRunContext,
        cancel: &CancelFlag,
    ) -> Result<RunSummary> {
        let mut outputs = Map::new();

        for (index, step) in input.definition.steps.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!(run_id = %input.run_id, label = %step.label, "Run cancelled before step");
                return Ok(RunSummary {
                    run_id: input.run_id.clone(),
                    status: RunStatus::Cancelled,
                    steps_completed: index,
                    outputs,
                });
            }

            let mut context = context.lock().await;
            context
                .register_step_parameters(step.parameters.clone(), &input.organization)
                .await
                .with_context(|| format!("Failed to register parameters for step {}", step.label))?;

            let output = self
                .executor
                .execute(step, &context)
                .await
                .with_context(|| format!("Step {} failed", step.label))?;

            let output_parameter = step.output();
            context
                .record_output(&output_parameter, output.clone())
                .with_context(|| format!("Failed to record output of step {}", step.label))?;
            outputs.insert(output_parameter.key, output);
        }

        Ok(RunSummary {
            run_id: input.run_id.clone(),
            status: RunStatus::Completed,
            steps_completed: input.definition.steps.len(),
            outputs,
        })
    }
}

/// Message carried by a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::StepDefinition;
    use crate::executor::EchoExecutor;
    use runbind_core::memory::{InMemoryCredentialStore, InMemoryExternalSecretStore};
    use runbind_core::{
        ContextParameter, ResolverConfig, RunContext, WorkflowParameter, WorkflowParameterType,
    };
    use serde_json::json;

    fn runner() -> WorkflowRunner {
        let registry = RunContextRegistry::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryExternalSecretStore::new()),
            ResolverConfig::default(),
        );
        WorkflowRunner::new(Arc::new(registry), Arc::new(EchoExecutor))
    }

    fn input(definition: WorkflowDefinition, inputs: Value) -> RunInput {
        RunInput {
            run_id: "wr_1".to_string(),
            organization: Organization::new("o_1"),
            definition: Arc::new(definition),
            inputs: inputs.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_run_completes_and_discards() {
        let runner = runner();
        let definition = WorkflowDefinition {
            workflow_parameters: vec![
                WorkflowParameter::new("url", WorkflowParameterType::String),
                WorkflowParameter::new("site", WorkflowParameterType::Json),
            ],
            steps: vec![
                StepDefinition::new("open")
                    .with_parameter(WorkflowParameter::new("url", WorkflowParameterType::String)),
                StepDefinition::new("read")
                    .with_parameter(ContextParameter::from_workflow("host", "site")),
            ],
            ..Default::default()
        };

        let summary = runner
            .run(
                &input(
                    definition,
                    json!({"url": "https://example.com", "site": {"host": "example.com"}}),
                ),
                &CancelFlag::default(),
            )
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.steps_completed, 2);
        assert_eq!(
            summary.outputs["open_output"]["extracted_information"]["url"],
            json!("https://example.com")
        );
        assert_eq!(
            summary.outputs["read_output"]["extracted_information"]["host"],
            json!("example.com")
        );
        assert!(runner.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_run_discards() {
        let runner = runner();
        let definition = WorkflowDefinition {
            steps: vec![StepDefinition::new("open")],
            ..Default::default()
        };
        let cancel = CancelFlag::default();
        cancel.store(true, Ordering::SeqCst);

        let summary = runner
            .run(&input(definition, json!({})), &cancel)
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.steps_completed, 0);
        assert!(runner.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_step_registration_discards() {
        let runner = runner();
        let definition = WorkflowDefinition {
            steps: vec![StepDefinition::new("open").with_parameter(
                ContextParameter::from_workflow("email", "profile"),
            )],
            ..Default::default()
        };

        let err = runner
            .run(&input(definition, json!({})), &CancelFlag::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("open"));
        assert!(runner.registry().is_empty().await);
    }

    struct PanickingExecutor;

    #[async_trait::async_trait]
    impl StepExecutor for PanickingExecutor {
        async fn execute(&self, step: &StepDefinition, _context: &RunContext) -> Result<Value> {
            panic!("executor crashed on {}", step.label);
        }
    }

    #[tokio::test]
    async fn test_panicking_step_discards() {
        let registry = RunContextRegistry::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryExternalSecretStore::new()),
            ResolverConfig::default(),
        );
        let runner = WorkflowRunner::new(Arc::new(registry), Arc::new(PanickingExecutor));
        let definition = WorkflowDefinition {
            steps: vec![StepDefinition::new("open")],
            ..Default::default()
        };

        let err = runner
            .run(&input(definition, json!({})), &CancelFlag::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("executor crashed on open"));
        assert!(runner.registry().is_empty().await);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[tokio::test]
    async fn test_duplicate_run_keeps_live_context() {
        let runner = runner();
        let definition = WorkflowDefinition::default();
        runner
            .registry()
            .create("wr_1", Organization::new("o_1"), Default::default())
            .await
            .unwrap();

        let result = runner
            .run(&input(definition, json!({})), &CancelFlag::default())
            .await;

        assert!(result.is_err());
        assert!(runner.registry().contains("wr_1").await);
    }
}
