// Parameter definitions
//
// A parameter is a declared binding point resolved once per run (or per step
// for deferred kinds). Kinds are a tagged enum so every resolution path has to
// match on all of them. Context parameters refer to their source by key and
// kind instead of holding the source definition itself; the value is looked
// up in the run's parameter store when it is needed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix every output parameter key carries (`<block-label>_output`)
pub const OUTPUT_KEY_SUFFIX: &str = "_output";

/// Discriminant of a parameter definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Workflow,
    Context,
    Output,
    Credential,
    ExternalSecret,
}

impl ParameterKind {
    /// Whether a context parameter may take its value from this kind
    pub fn is_valid_context_source(&self) -> bool {
        matches!(
            self,
            ParameterKind::Workflow | ParameterKind::Context | ParameterKind::Output
        )
    }
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterKind::Workflow => write!(f, "workflow"),
            ParameterKind::Context => write!(f, "context"),
            ParameterKind::Output => write!(f, "output"),
            ParameterKind::Credential => write!(f, "credential"),
            ParameterKind::ExternalSecret => write!(f, "external_secret"),
        }
    }
}

/// Value type of a workflow parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Json,
    FileUrl,
    /// The bound value is a credential id, resolved through the credential path
    CredentialId,
}

impl WorkflowParameterType {
    pub fn is_credential_reference(&self) -> bool {
        matches!(self, WorkflowParameterType::CredentialId)
    }
}

/// Symbolic reference to another parameter in the same run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterRef {
    pub kind: ParameterKind,
    pub key: String,
}

impl ParameterRef {
    pub fn new(kind: ParameterKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// Parameter bound once at run start from caller-supplied input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowParameter {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workflow_parameter_type: WorkflowParameterType,
    /// Value used by the executor when the caller supplies none
    #[serde(default)]
    pub default_value: Option<Value>,
}

impl WorkflowParameter {
    pub fn new(key: impl Into<String>, workflow_parameter_type: WorkflowParameterType) -> Self {
        Self {
            key: key.into(),
            description: None,
            workflow_parameter_type,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Result produced by one workflow step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputParameter {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl OutputParameter {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
        }
    }

    /// Output parameter for a block, following the `<label>_output` convention
    pub fn for_block(label: &str) -> Self {
        Self::new(format!("{label}{OUTPUT_KEY_SUFFIX}"))
    }

    /// Block label encoded in the key, if the key follows the convention
    pub fn block_label(&self) -> Option<&str> {
        self.key
            .strip_suffix(OUTPUT_KEY_SUFFIX)
            .filter(|label| !label.is_empty())
    }
}

/// Parameter derived from another parameter's resolved value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextParameter {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source: ParameterRef,
}

impl ContextParameter {
    pub fn new(key: impl Into<String>, source: ParameterRef) -> Self {
        Self {
            key: key.into(),
            description: None,
            source,
        }
    }

    pub fn from_workflow(key: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self::new(key, ParameterRef::new(ParameterKind::Workflow, source_key))
    }

    pub fn from_context(key: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self::new(key, ParameterRef::new(ParameterKind::Context, source_key))
    }

    pub fn from_output(key: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self::new(key, ParameterRef::new(ParameterKind::Output, source_key))
    }
}

/// Reference to a stored credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialParameter {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Either a literal credential id or the key of a parameter whose value is one
    pub credential_id: String,
}

impl CredentialParameter {
    pub fn new(key: impl Into<String>, credential_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
            credential_id: credential_id.into(),
        }
    }
}

/// Reference to a secret held by an external secret store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSecretParameter {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Key under which the external store holds the secret
    pub secret_key: String,
}

impl ExternalSecretParameter {
    pub fn new(key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
            secret_key: secret_key.into(),
        }
    }
}

/// Any parameter a workflow can declare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parameter_type", rename_all = "snake_case")]
pub enum Parameter {
    Workflow(WorkflowParameter),
    Context(ContextParameter),
    Output(OutputParameter),
    Credential(CredentialParameter),
    ExternalSecret(ExternalSecretParameter),
}

impl Parameter {
    pub fn key(&self) -> &str {
        match self {
            Parameter::Workflow(p) => &p.key,
            Parameter::Context(p) => &p.key,
            Parameter::Output(p) => &p.key,
            Parameter::Credential(p) => &p.key,
            Parameter::ExternalSecret(p) => &p.key,
        }
    }

    pub fn kind(&self) -> ParameterKind {
        match self {
            Parameter::Workflow(_) => ParameterKind::Workflow,
            Parameter::Context(_) => ParameterKind::Context,
            Parameter::Output(_) => ParameterKind::Output,
            Parameter::Credential(_) => ParameterKind::Credential,
            Parameter::ExternalSecret(_) => ParameterKind::ExternalSecret,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Parameter::Workflow(p) => p.description.as_deref(),
            Parameter::Context(p) => p.description.as_deref(),
            Parameter::Output(p) => p.description.as_deref(),
            Parameter::Credential(p) => p.description.as_deref(),
            Parameter::ExternalSecret(p) => p.description.as_deref(),
        }
    }

    /// Symbolic reference to this parameter
    pub fn reference(&self) -> ParameterRef {
        ParameterRef::new(self.kind(), self.key())
    }

    pub fn as_context(&self) -> Option<&ContextParameter> {
        match self {
            Parameter::Context(p) => Some(p),
            _ => None,
        }
    }
}

impl From<WorkflowParameter> for Parameter {
    fn from(p: WorkflowParameter) -> Self {
        Parameter::Workflow(p)
    }
}

impl From<ContextParameter> for Parameter {
    fn from(p: ContextParameter) -> Self {
        Parameter::Context(p)
    }
}

impl From<OutputParameter> for Parameter {
    fn from(p: OutputParameter) -> Self {
        Parameter::Output(p)
    }
}

impl From<CredentialParameter> for Parameter {
    fn from(p: CredentialParameter) -> Self {
        Parameter::Credential(p)
    }
}

impl From<ExternalSecretParameter> for Parameter {
    fn from(p: ExternalSecretParameter) -> Self {
        Parameter::ExternalSecret(p)
    }
}

/// Secret-bearing parameter resolved eagerly when a run starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "parameter_type", rename_all = "snake_case")]
pub enum SecretParameter {
    Credential(CredentialParameter),
    ExternalSecret(ExternalSecretParameter),
}

impl SecretParameter {
    pub fn key(&self) -> &str {
        match self {
            SecretParameter::Credential(p) => &p.key,
            SecretParameter::ExternalSecret(p) => &p.key,
        }
    }
}

impl From<SecretParameter> for Parameter {
    fn from(p: SecretParameter) -> Self {
        match p {
            SecretParameter::Credential(p) => Parameter::Credential(p),
            SecretParameter::ExternalSecret(p) => Parameter::ExternalSecret(p),
        }
    }
}

impl From<CredentialParameter> for SecretParameter {
    fn from(p: CredentialParameter) -> Self {
        SecretParameter::Credential(p)
    }
}

impl From<ExternalSecretParameter> for SecretParameter {
    fn from(p: ExternalSecretParameter) -> Self {
        SecretParameter::ExternalSecret(p)
    }
}
