// Collaborator traits
//
// The engine calls into two stores it does not own:
// - CredentialStore: organization-scoped credential rows and their secrets
// - ExternalSecretStore: key/value secrets held outside the credential store
//
// In-memory implementations live in `memory`; production implementations sit
// behind a database or a cloud secrets manager.

use async_trait::async_trait;

use crate::credential::{Credential, CreditCardSecret, PasswordSecret};
use crate::error::Result;

// ============================================================================
// CredentialStore - Organization-scoped credential lookup
// ============================================================================

/// Trait for fetching credentials and their secret halves
///
/// `Ok(None)` means "no such row"; `Err` is reserved for store failures.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a credential row if it exists and belongs to the organization
    async fn get_credential(
        &self,
        credential_id: &str,
        organization_id: &str,
    ) -> Result<Option<Credential>>;

    /// Fetch the secret of a password credential
    async fn get_password_secret(&self, credential_id: &str) -> Result<Option<PasswordSecret>>;

    /// Fetch the secret of a credit card credential
    async fn get_credit_card_secret(
        &self,
        credential_id: &str,
    ) -> Result<Option<CreditCardSecret>>;
}

// ============================================================================
// ExternalSecretStore - Key/value secrets
// ============================================================================

/// Trait for fetching secrets from an external secrets manager
#[async_trait]
pub trait ExternalSecretStore: Send + Sync {
    /// Fetch a secret value by key, `None` if the store has no value
    async fn get_secret(&self, secret_key: &str) -> Result<Option<String>>;
}
