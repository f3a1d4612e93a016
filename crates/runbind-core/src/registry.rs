// Run context registry
//
// Maps run ids to live RunContexts. Shared by every concurrently executing
// run; each context is handed out as its own mutex so one run's resolution
// never blocks another's. The executor must discard a run's context when the
// run completes, fails or is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::adapter::CredentialSecretAdapter;
use crate::config::ResolverConfig;
use crate::context::{RunContext, RunDeclarations};
use crate::credential::Organization;
use crate::error::{ResolutionError, Result};
use crate::parameter::{ContextParameter, OutputParameter, Parameter};
use crate::traits::{CredentialStore, ExternalSecretStore};
use crate::vault::SecretVault;

/// Shared handle to a run's context
pub type SharedRunContext = Arc<Mutex<RunContext>>;

struct RegistryEntry {
    context: SharedRunContext,
    created_at: DateTime<Utc>,
}

/// Registry of live run contexts
pub struct RunContextRegistry {
    credentials: Arc<dyn CredentialStore>,
    secrets: Arc<dyn ExternalSecretStore>,
    config: ResolverConfig,
    contexts: RwLock<HashMap<String, RegistryEntry>>,
}

impl RunContextRegistry {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        secrets: Arc<dyn ExternalSecretStore>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            credentials,
            secrets,
            config,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Build and initialize a context for `run_id`.
    ///
    /// Fails with `RunContextAlreadyInitialized` when the run id is live. A
    /// failed initialization registers nothing.
    pub async fn create(
        &self,
        run_id: &str,
        organization: Organization,
        declarations: RunDeclarations,
    ) -> Result<SharedRunContext> {
        if self.contains(run_id).await {
            return Err(ResolutionError::RunContextAlreadyInitialized(
                run_id.to_string(),
            ));
        }

        let adapter = CredentialSecretAdapter::new(self.credentials.clone(), self.secrets.clone())
            .with_fetch_timeout(self.config.fetch_timeout);
        let vault = SecretVault::with_prefix(self.config.handle_prefix.clone());
        let mut context = RunContext::new(run_id, organization, adapter, vault);

        // Resolution may suspend on collaborator fetches; keep the map unlocked
        context.initialize(declarations).await?;

        let created_at = context.created_at();
        let shared = Arc::new(Mutex::new(context));

        let mut contexts = self.contexts.write().await;
        if contexts.contains_key(run_id) {
            return Err(ResolutionError::RunContextAlreadyInitialized(
                run_id.to_string(),
            ));
        }
        contexts.insert(
            run_id.to_string(),
            RegistryEntry {
                context: shared.clone(),
                created_at,
            },
        );

        info!(run_id = %run_id, "Run context created");
        Ok(shared)
    }

    /// Context of a live run
    pub async fn get(&self, run_id: &str) -> Result<SharedRunContext> {
        self.contexts
            .read()
            .await
            .get(run_id)
            .map(|entry| entry.context.clone())
            .ok_or_else(|| ResolutionError::not_initialized(run_id))
    }

    /// Drop a run's context. Returns whether one was registered.
    pub async fn discard(&self, run_id: &str) -> bool {
        let removed = self.contexts.write().await.remove(run_id).is_some();
        if removed {
            info!(run_id = %run_id, "Run context discarded");
        }
        removed
    }

    /// Drop every context older than `max_age`, returning the discarded run ids
    pub async fn discard_expired(&self, max_age: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut contexts = self.contexts.write().await;

        let expired: Vec<String> = contexts
            .iter()
            .filter(|(_, entry)| {
                (now - entry.created_at).to_std().unwrap_or_default() > max_age
            })
            .map(|(run_id, _)| run_id.clone())
            .collect();

        for run_id in &expired {
            contexts.remove(run_id);
            warn!(run_id = %run_id, "Discarding expired run context");
        }
        expired
    }

    pub async fn contains(&self, run_id: &str) -> bool {
        self.contexts.read().await.contains_key(run_id)
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    pub async fn run_ids(&self) -> Vec<String> {
        self.contexts.read().await.keys().cloned().collect()
    }

    // ========================================================================
    // Delegating operations
    // ========================================================================

    pub async fn register_step_parameters(
        &self,
        run_id: &str,
        parameters: Vec<Parameter>,
        organization: &Organization,
    ) -> Result<()> {
        let context = self.get(run_id).await?;
        let mut context = context.lock().await;
        context
            .register_step_parameters(parameters, organization)
            .await
    }

    pub async fn record_output(
        &self,
        run_id: &str,
        output: &OutputParameter,
        value: Value,
    ) -> Result<()> {
        let context = self.get(run_id).await?;
        let mut context = context.lock().await;
        context.record_output(output, value)
    }

    pub async fn add_context_parameter(
        &self,
        run_id: &str,
        parameter: ContextParameter,
    ) -> Result<()> {
        let context = self.get(run_id).await?;
        let mut context = context.lock().await;
        context.add_context_parameter(parameter)
    }
}

impl std::fmt::Debug for RunContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContextRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCredentialStore, InMemoryExternalSecretStore};
    use crate::parameter::CredentialParameter;
    use serde_json::json;

    fn registry() -> RunContextRegistry {
        RunContextRegistry::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryExternalSecretStore::new()),
            ResolverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_get_discard() {
        let registry = registry();

        registry
            .create("wr_1", Organization::new("o_1"), RunDeclarations::default())
            .await
            .unwrap();
        assert!(registry.contains("wr_1").await);

        let context = registry.get("wr_1").await.unwrap();
        assert_eq!(context.lock().await.run_id(), "wr_1");

        assert!(registry.discard("wr_1").await);
        assert!(!registry.discard("wr_1").await);
        assert!(matches!(
            registry.get("wr_1").await.unwrap_err(),
            ResolutionError::RunContextNotInitialized(id) if id == "wr_1"
        ));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let registry = registry();
        let org = Organization::new("o_1");

        registry
            .create("wr_1", org.clone(), RunDeclarations::default())
            .await
            .unwrap();
        let err = registry
            .create("wr_1", org, RunDeclarations::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::RunContextAlreadyInitialized(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_registers_nothing() {
        let registry = registry();

        let err = registry
            .create(
                "wr_1",
                Organization::new("o_1"),
                RunDeclarations {
                    secret_parameters: vec![CredentialParameter::new("login", "missing").into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::CredentialNotFound(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_creates() {
        let registry = Arc::new(registry());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .create(
                            &format!("wr_{i}"),
                            Organization::new("o_1"),
                            RunDeclarations::default(),
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut run_ids = registry.run_ids().await;
        run_ids.sort();
        assert_eq!(run_ids.len(), 16);
        assert!(run_ids.contains(&"wr_7".to_string()));
    }

    #[tokio::test]
    async fn test_delegating_operations() {
        let registry = registry();
        let org = Organization::new("o_1");
        registry
            .create(
                "wr_1",
                org.clone(),
                RunDeclarations {
                    output_parameters: vec![OutputParameter::for_block("extract")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        registry
            .add_context_parameter("wr_1", ContextParameter::from_output("email", "extract_output"))
            .await
            .unwrap();
        registry
            .record_output(
                "wr_1",
                &OutputParameter::for_block("extract"),
                json!({"email": "a@example.com"}),
            )
            .await
            .unwrap();

        let context = registry.get("wr_1").await.unwrap();
        assert_eq!(
            context.lock().await.get("email").unwrap(),
            &json!("a@example.com")
        );

        let err = registry
            .register_step_parameters("wr_2", Vec::new(), &org)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::RunContextNotInitialized(_)));
    }

    #[tokio::test]
    async fn test_discard_expired() {
        let registry = registry();
        registry
            .create("wr_1", Organization::new("o_1"), RunDeclarations::default())
            .await
            .unwrap();

        assert!(registry.discard_expired(Duration::from_secs(3600)).await.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let expired = registry.discard_expired(Duration::from_millis(1)).await;
        assert_eq!(expired, vec!["wr_1".to_string()]);
        assert!(registry.is_empty().await);
    }
}
