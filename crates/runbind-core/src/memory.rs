// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them perfect for:
// - Dry runs that don't need a database or secrets manager
// - Unit and integration tests
// - Quick prototyping

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::credential::{Credential, CredentialType, CreditCardSecret, PasswordSecret};
use crate::error::Result;
use crate::traits::{CredentialStore, ExternalSecretStore};

// ============================================================================
// InMemoryCredentialStore - Stores credentials in memory
// ============================================================================

/// In-memory credential store
///
/// Stores credential rows keyed by credential ID, with password and credit
/// card secrets in separate maps like the tables they stand in for.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    credentials: Arc<RwLock<HashMap<String, Credential>>>,
    passwords: Arc<RwLock<HashMap<String, PasswordSecret>>>,
    credit_cards: Arc<RwLock<HashMap<String, CreditCardSecret>>>,
    latency: Option<Duration>,
}

impl InMemoryCredentialStore {
    /// Create a new in-memory credential store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup (useful for timeout tests)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add a credential row without a secret
    pub async fn add_credential(&self, credential: Credential) {
        self.credentials
            .write()
            .await
            .insert(credential.credential_id.clone(), credential);
    }

    /// Add a password credential and its secret
    pub async fn add_password(
        &self,
        credential_id: &str,
        organization_id: &str,
        secret: PasswordSecret,
    ) {
        self.add_credential(Credential::new(
            credential_id,
            organization_id,
            credential_id,
            CredentialType::Password,
        ))
        .await;
        self.passwords
            .write()
            .await
            .insert(credential_id.to_string(), secret);
    }

    /// Add a credit card credential and its secret
    pub async fn add_credit_card(
        &self,
        credential_id: &str,
        organization_id: &str,
        secret: CreditCardSecret,
    ) {
        self.add_credential(Credential::new(
            credential_id,
            organization_id,
            credential_id,
            CredentialType::CreditCard,
        ))
        .await;
        self.credit_cards
            .write()
            .await
            .insert(credential_id.to_string(), secret);
    }

    /// Get all credential IDs
    pub async fn credential_ids(&self) -> Vec<String> {
        self.credentials.read().await.keys().cloned().collect()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credential(
        &self,
        credential_id: &str,
        organization_id: &str,
    ) -> Result<Option<Credential>> {
        self.simulate_latency().await;
        Ok(self
            .credentials
            .read()
            .await
            .get(credential_id)
            .filter(|c| c.organization_id == organization_id)
            .cloned())
    }

    async fn get_password_secret(&self, credential_id: &str) -> Result<Option<PasswordSecret>> {
        self.simulate_latency().await;
        Ok(self.passwords.read().await.get(credential_id).cloned())
    }

    async fn get_credit_card_secret(
        &self,
        credential_id: &str,
    ) -> Result<Option<CreditCardSecret>> {
        self.simulate_latency().await;
        Ok(self.credit_cards.read().await.get(credential_id).cloned())
    }
}

// ============================================================================
// InMemoryExternalSecretStore - Stores key/value secrets in memory
// ============================================================================

/// In-memory external secret store
///
/// Counts lookups so tests can assert how often the store was called.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExternalSecretStore {
    secrets: Arc<RwLock<HashMap<String, String>>>,
    lookups: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl InMemoryExternalSecretStore {
    /// Create a new in-memory secret store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup (useful for timeout tests)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a secret
    pub async fn insert(&self, secret_key: impl Into<String>, value: impl Into<String>) {
        self.secrets
            .write()
            .await
            .insert(secret_key.into(), value.into());
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalSecretStore for InMemoryExternalSecretStore {
    async fn get_secret(&self, secret_key: &str) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.secrets.read().await.get(secret_key).cloned())
    }
}
