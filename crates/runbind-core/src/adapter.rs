// Credential and secret adapter
//
// Pulls credential records and external secrets from their stores and mints
// vault entries for them. Callers only ever receive handles:
// - password credential -> {username, password, totp?}
// - credit card credential -> one handle per card field
// - external secret -> a single handle (or nothing when the store has no value)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::credential::{CredentialType, Organization};
use crate::error::{ResolutionError, Result};
use crate::traits::{CredentialStore, ExternalSecretStore};
use crate::vault::SecretVault;

/// Field name -> resolved value (secret handles for credentials)
pub type FieldMap = Map<String, Value>;

/// Resolves credentials and external secrets into vault handles
#[derive(Clone)]
pub struct CredentialSecretAdapter {
    credentials: Arc<dyn CredentialStore>,
    secrets: Arc<dyn ExternalSecretStore>,
    fetch_timeout: Option<Duration>,
}

impl CredentialSecretAdapter {
    /// Create an adapter over the two stores
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        secrets: Arc<dyn ExternalSecretStore>,
    ) -> Self {
        Self {
            credentials,
            secrets,
            fetch_timeout: None,
        }
    }

    /// Bound every store call by `timeout`
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Fetch a credential owned by `organization` and mint handles for its fields
    pub async fn resolve_credential(
        &self,
        vault: &mut SecretVault,
        credential_id: &str,
        organization: &Organization,
    ) -> Result<FieldMap> {
        info!(
            credential_id = %credential_id,
            organization_id = %organization.organization_id,
            "Fetching credential"
        );

        let credential = self
            .fetch(
                || format!("credential {credential_id}"),
                self.credentials
                    .get_credential(credential_id, &organization.organization_id),
            )
            .await
            .inspect_err(|e| {
                error!(credential_id = %credential_id, error = %e, "Failed to fetch credential")
            })?
            .filter(|c| c.organization_id == organization.organization_id)
            .ok_or_else(|| ResolutionError::credential_not_found(credential_id))?;

        let mut fields = FieldMap::new();
        match credential.credential_type {
            CredentialType::Password => {
                let secret = self
                    .fetch(
                        || format!("password secret {credential_id}"),
                        self.credentials
                            .get_password_secret(&credential.credential_id),
                    )
                    .await?
                    .ok_or_else(|| ResolutionError::credential_not_found(credential_id))?;

                let username = vault.mint_field("username", secret.username);
                fields.insert("username".to_string(), Value::String(username));
                let password = vault.mint_field("password", secret.password);
                fields.insert("password".to_string(), Value::String(password));
                if let Some(totp) = secret.totp.filter(|seed| !seed.is_empty()) {
                    let totp = vault.mint_totp(totp);
                    fields.insert("totp".to_string(), Value::String(totp));
                }
            }
            CredentialType::CreditCard => {
                let card = self
                    .fetch(
                        || format!("credit card secret {credential_id}"),
                        self.credentials
                            .get_credit_card_secret(&credential.credential_id),
                    )
                    .await?
                    .ok_or_else(|| ResolutionError::credential_not_found(credential_id))?;

                for (field, value) in card.fields() {
                    let handle = vault.mint_field(field, value);
                    fields.insert(field.to_string(), Value::String(handle));
                }
            }
            CredentialType::Unsupported => {
                error!(credential_id = %credential_id, "Unsupported credential type");
                return Err(ResolutionError::credential_not_found(credential_id));
            }
        }

        Ok(fields)
    }

    /// Fetch an external secret once and mint a handle for it.
    ///
    /// Returns `None` without touching the vault when the store has no value.
    pub async fn resolve_external_secret(
        &self,
        vault: &mut SecretVault,
        secret_key: &str,
    ) -> Result<Option<String>> {
        let value = self
            .fetch(
                || format!("external secret {secret_key}"),
                self.secrets.get_secret(secret_key),
            )
            .await?;

        Ok(value.map(|value| vault.mint(value)))
    }

    async fn fetch<T>(
        &self,
        what: impl FnOnce() -> String,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.fetch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| ResolutionError::FetchTimeout {
                    what: what(),
                    timeout,
                })?,
            None => call.await,
        }
    }
}

impl std::fmt::Debug for CredentialSecretAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSecretAdapter")
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}
