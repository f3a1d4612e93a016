// Integration tests for the dry-run path
//
// Load the bundled manifest, run it with the echo executor and check that
// step outputs carry opaque handles only.

use async_trait::async_trait;
use runbind_core::{RunContext, RunContextRegistry};
use runbind_worker::{
    CancelFlag, EchoExecutor, Manifest, RunInput, RunStatus, StepDefinition, StepExecutor,
    WorkflowRunner,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn manifest_path() -> String {
    format!("{}/manifests/login.json", env!("CARGO_MANIFEST_DIR"))
}

async fn runner_for(
    manifest: &Manifest,
    executor: Arc<dyn StepExecutor>,
) -> (WorkflowRunner, RunInput) {
    let (credentials, secrets) = manifest.seed_stores().await;
    let registry = RunContextRegistry::new(
        Arc::new(credentials),
        Arc::new(secrets),
        Default::default(),
    );
    let input = RunInput {
        run_id: manifest.run_id.clone().unwrap_or_else(|| "wr_test".to_string()),
        organization: manifest.organization.clone(),
        definition: Arc::new(manifest.workflow.clone()),
        inputs: manifest.inputs.clone(),
    };
    (WorkflowRunner::new(Arc::new(registry), executor), input)
}

#[tokio::test]
async fn test_bundled_manifest_runs_without_leaking_secrets() {
    let manifest = Manifest::load(manifest_path()).await.unwrap();
    let (runner, input) = runner_for(&manifest, Arc::new(EchoExecutor)).await;

    let summary = runner.run(&input, &CancelFlag::default()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.steps_completed, 2);
    assert_eq!(
        summary.outputs["open_output"]["extracted_information"]["url"],
        json!("https://example.com/login")
    );

    let rendered = serde_json::to_string(&summary).unwrap();
    for cleartext in ["demo-pass", "JBSWY3DPEHPK3PXP", "tok_demo"] {
        assert!(!rendered.contains(cleartext), "output leaks {cleartext}");
    }
    let login = &summary.outputs["sign_in_output"]["extracted_information"]["login"];
    assert!(login["password"].as_str().unwrap().starts_with("secret_"));
    assert!(runner.registry().is_empty().await);
}

/// Reveals the login password at the point of use and reports only its length
struct RevealingExecutor {
    reveals: AtomicUsize,
}

#[async_trait]
impl StepExecutor for RevealingExecutor {
    async fn execute(&self, step: &StepDefinition, context: &RunContext) -> anyhow::Result<Value> {
        if step.label != "sign_in" {
            return Ok(json!({"status": "completed"}));
        }
        let login = context.get("login")?;
        let password = context
            .reveal(&login["password"])
            .ok_or_else(|| anyhow::anyhow!("password handle did not resolve"))?;
        self.reveals.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"status": "completed", "password_length": password.len()}))
    }
}

#[tokio::test]
async fn test_executor_reveals_at_point_of_use() {
    let manifest = Manifest::load(manifest_path()).await.unwrap();
    let executor = Arc::new(RevealingExecutor {
        reveals: AtomicUsize::new(0),
    });
    let (runner, input) = runner_for(&manifest, executor.clone()).await;

    let summary = runner.run(&input, &CancelFlag::default()).await.unwrap();

    assert_eq!(executor.reveals.load(Ordering::SeqCst), 1);
    assert_eq!(summary.outputs["sign_in_output"]["password_length"], json!(9));
}
