// Workflow run driver
//
// Drives runs through the runbind-core engine the way a run executor does:
// one RunContext per run, steps executed in order, context discarded when
// the run ends.

pub mod config;
pub mod definition;
pub mod executor;
pub mod manifest;
pub mod runner;

// Re-export main types
pub use config::RunnerConfig;
pub use definition::{RunInputs, StepDefinition, WorkflowDefinition};
pub use executor::{EchoExecutor, StepExecutor};
pub use manifest::{CredentialFixture, Manifest};
pub use runner::inmemory::{InMemoryRunner, RunOutcome};
pub use runner::{CancelFlag, RunInput, RunStatus, RunSummary, WorkflowRunner};
