// Dry-run manifest
//
// A JSON document describing one run: the workflow, its organization and
// inputs, and fixture credentials and external secrets to seed the in-memory
// stores with.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use runbind_core::memory::{InMemoryCredentialStore, InMemoryExternalSecretStore};
use runbind_core::{CreditCardSecret, Organization, PasswordSecret};
use serde::Deserialize;

use crate::definition::{RunInputs, WorkflowDefinition};

/// Credential seeded into the in-memory store
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialFixture {
    Password {
        credential_id: String,
        secret: PasswordSecret,
    },
    CreditCard {
        credential_id: String,
        secret: CreditCardSecret,
    },
}

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub run_id: Option<String>,
    pub organization: Organization,
    pub workflow: WorkflowDefinition,
    #[serde(default)]
    pub inputs: RunInputs,
    #[serde(default)]
    pub credentials: Vec<CredentialFixture>,
    /// External secret key -> value
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl Manifest {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// In-memory stores holding the manifest's fixtures, owned by its organization
    pub async fn seed_stores(&self) -> (InMemoryCredentialStore, InMemoryExternalSecretStore) {
        let credentials = InMemoryCredentialStore::new();
        let org_id = &self.organization.organization_id;
        for fixture in &self.credentials {
            match fixture {
                CredentialFixture::Password {
                    credential_id,
                    secret,
                } => {
                    credentials
                        .add_password(credential_id, org_id, secret.clone())
                        .await
                }
                CredentialFixture::CreditCard {
                    credential_id,
                    secret,
                } => {
                    credentials
                        .add_credit_card(credential_id, org_id, secret.clone())
                        .await
                }
            }
        }

        let secrets = InMemoryExternalSecretStore::new();
        for (key, value) in &self.secrets {
            secrets.insert(key.clone(), value.clone()).await;
        }

        (credentials, secrets)
    }
}
