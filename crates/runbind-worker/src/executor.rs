// Step execution
// Decision: Steps see the run context read-only. They read opaque values with
// `get` and call `reveal` only at the point where a secret is consumed.

use anyhow::Result;
use async_trait::async_trait;
use runbind_core::RunContext;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::definition::StepDefinition;

/// Executes one step of a workflow run
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run the step and return its output value
    async fn execute(&self, step: &StepDefinition, context: &RunContext) -> Result<Value>;
}

/// Executor that echoes a step's resolved parameter values as its output.
///
/// Values are copied as resolved, so secret parameters come back as handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoExecutor;

#[async_trait]
impl StepExecutor for EchoExecutor {
    async fn execute(&self, step: &StepDefinition, context: &RunContext) -> Result<Value> {
        let mut extracted = Map::new();
        for parameter in &step.parameters {
            let key = parameter.key();
            if let Ok(value) = context.get(key) {
                extracted.insert(key.to_string(), value.clone());
            }
        }

        debug!(
            run_id = %context.run_id(),
            label = %step.label,
            values = extracted.len(),
            "Echoing step parameters"
        );

        Ok(json!({
            "status": "completed",
            "extracted_information": extracted,
        }))
    }
}
