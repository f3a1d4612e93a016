// Parameter and Secret Resolution Engine
//
// This crate binds the declared parameters of a workflow run to concrete
// values, one isolated RunContext per run.
//
// Key design decisions:
// - Stores are pluggable traits (CredentialStore, ExternalSecretStore); no DB dependency
// - Sensitive values live only in the run's SecretVault; parameter values carry opaque handles
// - Parameters are a tagged enum; resolution matches exhaustively on the kind
// - Context parameters name their source by key and are resolved by lookup
// - RunContextRegistry hands out one mutex per run; runs never share a lock

pub mod adapter;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod ordering;
pub mod output;
pub mod parameter;
pub mod registry;
pub mod store;
pub mod traits;
pub mod vault;

// In-memory implementations for tests and dry runs
pub mod memory;

// Re-exports for convenience
pub use adapter::{CredentialSecretAdapter, FieldMap};
pub use config::{ResolverConfig, ResolverConfigBuilder};
pub use context::{BlockMetadata, RunContext, RunDeclarations, WorkflowBinding};
pub use credential::{Credential, CredentialType, CreditCardSecret, Organization, PasswordSecret};
pub use error::{ResolutionError, Result};
pub use ordering::{registration_order, RegistrationPriority};
pub use parameter::{
    ContextParameter, CredentialParameter, ExternalSecretParameter, OutputParameter, Parameter,
    ParameterKind, ParameterRef, SecretParameter, WorkflowParameter, WorkflowParameterType,
};
pub use registry::{RunContextRegistry, SharedRunContext};
pub use store::ParameterStore;
pub use traits::{CredentialStore, ExternalSecretStore};
pub use vault::{SecretString, SecretVault};
