// Workflow definitions
//
// The shape a run driver hands to the engine: the workflow-level declarations
// and an ordered list of steps, each with the parameters it reads.

use anyhow::Result;
use runbind_core::{
    ContextParameter, OutputParameter, Parameter, RunDeclarations, SecretParameter,
    WorkflowBinding, WorkflowParameter,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Values supplied for the workflow parameters of one run
pub type RunInputs = Map<String, Value>;

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Block label; the step's output lands under `<label>_output`
    pub label: String,
    /// Parameters the step reads
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Explicit output parameter (defaults to `<label>_output`)
    #[serde(default)]
    pub output_parameter: Option<OutputParameter>,
}

impl StepDefinition {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parameters: Vec::new(),
            output_parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    /// Output parameter the step's result is recorded under
    pub fn output(&self) -> OutputParameter {
        self.output_parameter
            .clone()
            .unwrap_or_else(|| OutputParameter::for_block(&self.label))
    }
}

/// A workflow: declarations plus ordered steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub workflow_parameters: Vec<WorkflowParameter>,
    #[serde(default)]
    pub output_parameters: Vec<OutputParameter>,
    #[serde(default)]
    pub context_parameters: Vec<ContextParameter>,
    #[serde(default)]
    pub secret_parameters: Vec<SecretParameter>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Build the run's declarations from the definition and its inputs.
    ///
    /// A workflow parameter takes its input value, falling back to its
    /// default; one with neither fails. Every step's output parameter is
    /// declared unless it is already listed explicitly.
    pub fn declarations(&self, inputs: &RunInputs) -> Result<RunDeclarations> {
        let workflow_bindings = self
            .workflow_parameters
            .iter()
            .map(|parameter| {
                let value = inputs
                    .get(&parameter.key)
                    .or(parameter.default_value.as_ref())
                    .cloned()
                    .ok_or_else(|| {
                        anyhow::anyhow!("No value for workflow parameter {}", parameter.key)
                    })?;
                Ok(WorkflowBinding::new(parameter.clone(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut output_parameters = self.output_parameters.clone();
        for step in &self.steps {
            let output = step.output();
            if !output_parameters.iter().any(|p| p.key == output.key) {
                output_parameters.push(output);
            }
        }

        Ok(RunDeclarations {
            workflow_bindings,
            output_parameters,
            context_parameters: self.context_parameters.clone(),
            secret_parameters: self.secret_parameters.clone(),
        })
    }
}
