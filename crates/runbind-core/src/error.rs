// Error types for parameter and secret resolution
//
// Every variant here propagates to the run executor uncaught. Step outputs that
// report business-level errors are data, not errors, and never show up here.
// Secret values must never be formatted into any of these messages.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, ResolutionError>;

/// Errors that can occur while binding parameters for a run
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Two output parameters declared the same key at initialization
    #[error("Output parameter key collision: {0}")]
    OutputParameterKeyCollision(String),

    /// Credential is absent, owned by another organization, or of an unsupported kind
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    /// Operation on a run id that has no live context
    #[error("Run context not initialized for run {0}")]
    RunContextNotInitialized(String),

    /// `create` called for a run id that already has a live context
    #[error("Run context already initialized for run {0}")]
    RunContextAlreadyInitialized(String),

    /// Context parameter source is not a workflow, context or output parameter
    #[error("Invalid source for context parameter {key}: {source_kind} parameters cannot be a source")]
    InvalidParameterSource { key: String, source_kind: String },

    /// Source value of a context parameter was not a field-map
    #[error("Source value of context parameter {key} is not an object (source: {source_key})")]
    MalformedSourceValue { key: String, source_key: String },

    /// Workflow parameter marked as a credential reference holds a non-string value
    #[error("Credential reference {0} does not hold a string credential id")]
    InvalidCredentialReference(String),

    /// Step output feeding a context parameter is neither an object nor a list
    #[error("Context parameter {key} can only depend on an object or list output (output: {output_key})")]
    NonCollectionOutput { key: String, output_key: String },

    /// Parameter kind that must be resolved at initialization reached per-step registration
    #[error("{kind} parameter {key} should have been registered when the run context was initialized")]
    UnexpectedRegistration { key: String, kind: String },

    /// Context parameters reference each other in a loop
    #[error("Context parameter dependency cycle involving: {0}")]
    ContextDependencyCycle(String),

    /// No value is registered under the key
    #[error("Parameter not registered: {0}")]
    ParameterNotRegistered(String),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    /// External secret store failure
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// A collaborator fetch exceeded the configured timeout
    #[error("Fetch of {what} timed out after {timeout:?}")]
    FetchTimeout { what: String, timeout: Duration },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ResolutionError {
    /// Create a credential not found error
    pub fn credential_not_found(credential_id: impl Into<String>) -> Self {
        ResolutionError::CredentialNotFound(credential_id.into())
    }

    /// Create a run context not initialized error
    pub fn not_initialized(run_id: impl Into<String>) -> Self {
        ResolutionError::RunContextNotInitialized(run_id.into())
    }

    /// Create a credential store error
    pub fn credential_store(msg: impl Into<String>) -> Self {
        ResolutionError::CredentialStore(msg.into())
    }

    /// Create a secret store error
    pub fn secret_store(msg: impl Into<String>) -> Self {
        ResolutionError::SecretStore(msg.into())
    }

    /// Create a parameter not registered error
    pub fn not_registered(key: impl Into<String>) -> Self {
        ResolutionError::ParameterNotRegistered(key.into())
    }

    /// Whether the error indicates a malformed workflow definition rather than
    /// a runtime or collaborator failure
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            ResolutionError::OutputParameterKeyCollision(_)
                | ResolutionError::InvalidParameterSource { .. }
                | ResolutionError::UnexpectedRegistration { .. }
                | ResolutionError::ContextDependencyCycle(_)
        )
    }
}
