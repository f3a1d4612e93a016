// Run context
//
// The unit of isolation: one RunContext per workflow run. It owns the run's
// vault, parameter store and block metadata; nothing outside the context
// mutates them. All calls for a run are made sequentially by the run's
// executor, suspending only while a credential or secret is fetched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::adapter::CredentialSecretAdapter;
use crate::credential::Organization;
use crate::error::{ResolutionError, Result};
use crate::ordering::registration_order;
use crate::output;
use crate::parameter::{
    ContextParameter, CredentialParameter, ExternalSecretParameter, OutputParameter, Parameter,
    ParameterKind, SecretParameter, WorkflowParameter,
};
use crate::store::ParameterStore;
use crate::vault::SecretVault;

/// Free-form, non-secret metadata attached to a block (step) label
pub type BlockMetadata = Map<String, Value>;

/// A workflow parameter together with the value supplied for this run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBinding {
    pub parameter: WorkflowParameter,
    pub value: Value,
}

impl WorkflowBinding {
    pub fn new(parameter: WorkflowParameter, value: impl Into<Value>) -> Self {
        Self {
            parameter,
            value: value.into(),
        }
    }
}

/// Everything a run declares up front
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDeclarations {
    #[serde(default)]
    pub workflow_bindings: Vec<WorkflowBinding>,
    #[serde(default)]
    pub output_parameters: Vec<OutputParameter>,
    #[serde(default)]
    pub context_parameters: Vec<ContextParameter>,
    #[serde(default)]
    pub secret_parameters: Vec<SecretParameter>,
}

/// Parameter and secret state of a single workflow run
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    organization: Organization,
    created_at: DateTime<Utc>,
    adapter: CredentialSecretAdapter,
    vault: SecretVault,
    parameters: ParameterStore,
    blocks_metadata: HashMap<String, BlockMetadata>,
}

impl RunContext {
    /// Create an empty context. Use [`RunContext::initialize`] to bind the
    /// run's declarations.
    pub fn new(
        run_id: impl Into<String>,
        organization: Organization,
        adapter: CredentialSecretAdapter,
        vault: SecretVault,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            organization,
            created_at: Utc::now(),
            adapter,
            vault,
            parameters: ParameterStore::new(),
            blocks_metadata: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Bind the run's declarations.
    ///
    /// 1. workflow bindings (credential references go through the credential path)
    /// 2. output parameters (a repeated key is fatal)
    /// 3. secret parameters, resolved eagerly
    /// 4. context parameters, definition only
    pub async fn initialize(&mut self, declarations: RunDeclarations) -> Result<()> {
        let RunDeclarations {
            workflow_bindings,
            output_parameters,
            context_parameters,
            secret_parameters,
        } = declarations;

        for binding in workflow_bindings {
            self.register_workflow_binding(binding).await?;
        }

        for output in output_parameters {
            if self.parameters.is_defined(&output.key) {
                error!(run_id = %self.run_id, key = %output.key, "Output parameter key collision");
                return Err(ResolutionError::OutputParameterKeyCollision(output.key));
            }
            self.parameters.define(output.into());
        }

        for secret in secret_parameters {
            match secret {
                SecretParameter::Credential(p) => self.register_credential_parameter(p).await?,
                SecretParameter::ExternalSecret(p) => {
                    self.register_external_secret_parameter(p).await?
                }
            }
        }

        for context in context_parameters {
            validate_context_source(&context)?;
            self.parameters.define(context.into());
        }

        info!(
            run_id = %self.run_id,
            parameters = self.parameters.len(),
            secrets = self.vault.len(),
            "Run context initialized"
        );
        Ok(())
    }

    async fn register_workflow_binding(&mut self, binding: WorkflowBinding) -> Result<()> {
        let WorkflowBinding { parameter, value } = binding;

        if self.parameters.is_defined(&parameter.key) {
            warn!(
                run_id = %self.run_id,
                key = %parameter.key,
                "Duplicate workflow parameter key, using the new value"
            );
        }

        let value = if parameter.workflow_parameter_type.is_credential_reference() {
            let credential_id = value
                .as_str()
                .ok_or_else(|| ResolutionError::InvalidCredentialReference(parameter.key.clone()))?;
            let fields = self
                .adapter
                .resolve_credential(&mut self.vault, credential_id, &self.organization)
                .await?;
            Value::Object(fields)
        } else {
            value
        };

        let key = parameter.key.clone();
        self.parameters.define(parameter.into());
        self.parameters.set_value(key, value);
        Ok(())
    }

    async fn register_credential_parameter(&mut self, parameter: CredentialParameter) -> Result<()> {
        let credential_id = self.credential_id_for(&parameter)?;
        let fields = self
            .adapter
            .resolve_credential(&mut self.vault, &credential_id, &self.organization)
            .await?;

        let key = parameter.key.clone();
        self.parameters.define(parameter.into());
        self.parameters.set_value(key, Value::Object(fields));
        Ok(())
    }

    /// A credential id is either literal or the key of a parameter that
    /// already holds one
    fn credential_id_for(&self, parameter: &CredentialParameter) -> Result<String> {
        if parameter.credential_id.is_empty() {
            error!(run_id = %self.run_id, key = %parameter.key, "Credential id missing");
            return Err(ResolutionError::credential_not_found(&parameter.key));
        }

        let referenced = self
            .parameters
            .is_defined(&parameter.credential_id)
            .then(|| self.parameters.value(&parameter.credential_id))
            .flatten();

        match referenced {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Null) => {
                error!(run_id = %self.run_id, key = %parameter.key, "Referenced credential id is null");
                Err(ResolutionError::credential_not_found(&parameter.key))
            }
            Some(_) => Err(ResolutionError::InvalidCredentialReference(
                parameter.credential_id.clone(),
            )),
            None => Ok(parameter.credential_id.clone()),
        }
    }

    async fn register_external_secret_parameter(
        &mut self,
        parameter: ExternalSecretParameter,
    ) -> Result<()> {
        let handle = self
            .adapter
            .resolve_external_secret(&mut self.vault, &parameter.secret_key)
            .await?;

        match handle {
            Some(handle) => {
                let key = parameter.key.clone();
                self.parameters.define(parameter.into());
                self.parameters.set_value(key, Value::String(handle));
            }
            None => {
                warn!(
                    run_id = %self.run_id,
                    key = %parameter.key,
                    secret_key = %parameter.secret_key,
                    "External secret has no value, leaving parameter unregistered"
                );
            }
        }
        Ok(())
    }

    // ========================================================================
    // Per-step registration
    // ========================================================================

    /// Register a step's parameters before the step executes.
    ///
    /// Workflow, output and secret parameters must already be registered;
    /// reaching this path with one of them is an error. Context parameters
    /// are resolved from their source, except output-sourced ones, which are
    /// set by [`RunContext::record_output`].
    pub async fn register_step_parameters(
        &mut self,
        parameters: Vec<Parameter>,
        organization: &Organization,
    ) -> Result<()> {
        if organization.organization_id != self.organization.organization_id {
            warn!(
                run_id = %self.run_id,
                organization_id = %organization.organization_id,
                "Step registration for a different organization than the run"
            );
        }

        for parameter in registration_order(parameters)? {
            let key = parameter.key().to_string();
            let kind = parameter.kind();
            if self.parameters.is_defined(&key) && !self.parameters.is_pending_context(&key) {
                debug!(run_id = %self.run_id, key = %key, "Parameter already registered, skipping");
                continue;
            }

            match parameter {
                Parameter::Context(context) => self.register_context_parameter(context)?,
                Parameter::Workflow(_)
                | Parameter::Output(_)
                | Parameter::Credential(_)
                | Parameter::ExternalSecret(_) => {
                    let kind = kind.to_string();
                    error!(
                        run_id = %self.run_id,
                        key = %key,
                        kind = %kind,
                        "Parameter should have been registered at initialization"
                    );
                    return Err(ResolutionError::UnexpectedRegistration { key, kind });
                }
            }
        }

        Ok(())
    }

    fn register_context_parameter(&mut self, parameter: ContextParameter) -> Result<()> {
        let value = match parameter.source.kind {
            ParameterKind::Workflow | ParameterKind::Context => {
                let source_value = self
                    .parameters
                    .value(&parameter.source.key)
                    .ok_or_else(|| ResolutionError::not_registered(&parameter.source.key))?;
                let Value::Object(fields) = source_value else {
                    return Err(ResolutionError::MalformedSourceValue {
                        key: parameter.key.clone(),
                        source_key: parameter.source.key.clone(),
                    });
                };
                Some(fields.get(&parameter.key).cloned().unwrap_or(Value::Null))
            }
            // set by output propagation
            ParameterKind::Output => None,
            ParameterKind::Credential | ParameterKind::ExternalSecret => {
                return Err(ResolutionError::InvalidParameterSource {
                    key: parameter.key.clone(),
                    source_kind: parameter.source.kind.to_string(),
                });
            }
        };

        let key = parameter.key.clone();
        self.parameters.define(parameter.into());
        if let Some(value) = value {
            self.parameters.set_value(key, value);
        }
        Ok(())
    }

    /// Add a context parameter definition to the live run
    pub fn add_context_parameter(&mut self, parameter: ContextParameter) -> Result<()> {
        validate_context_source(&parameter)?;
        self.parameters.define(parameter.into());
        Ok(())
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Resolved value of a key. Secret-bearing values contain handles only.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.parameters
            .value(key)
            .ok_or_else(|| ResolutionError::not_registered(key))
    }

    /// Whether a value is registered under the key
    pub fn has(&self, key: &str) -> bool {
        self.parameters.has_value(key)
    }

    /// Stash an ad hoc value that does not flow through a declared parameter
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.parameters.set_value(key, value);
    }

    pub fn get_parameter(&self, key: &str) -> Option<&Parameter> {
        self.parameters.definition(key)
    }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters.is_defined(key)
    }

    /// Secret behind a handle, for use at the point of consumption only.
    ///
    /// Returns `None` for anything that is not a handle; callers treat that as
    /// "already a literal value".
    pub fn reveal(&self, handle_or_value: &Value) -> Option<&str> {
        self.vault.reveal(handle_or_value)
    }

    /// Number of vault entries held by this run
    pub fn secret_count(&self) -> usize {
        self.vault.len()
    }

    // ========================================================================
    // Outputs and metadata
    // ========================================================================

    /// Record a finished step's output and propagate it to dependents
    pub fn record_output(&mut self, output: &OutputParameter, value: Value) -> Result<()> {
        output::record_output(&mut self.parameters, output, value)
    }

    /// Metadata for a block label (empty when none was recorded)
    pub fn block_metadata(&self, label: &str) -> BlockMetadata {
        self.blocks_metadata.get(label).cloned().unwrap_or_default()
    }

    /// Merge fields into a block's metadata; new fields win
    pub fn update_block_metadata(&mut self, label: &str, fields: BlockMetadata) {
        self.blocks_metadata
            .entry(label.to_string())
            .or_default()
            .extend(fields);
    }
}

fn validate_context_source(parameter: &ContextParameter) -> Result<()> {
    if parameter.source.kind.is_valid_context_source() {
        Ok(())
    } else {
        Err(ResolutionError::InvalidParameterSource {
            key: parameter.key.clone(),
            source_kind: parameter.source.kind.to_string(),
        })
    }
}
