//! Sandbox lifecycle, workflow installation, and trial orchestration.
//!
//! Consumes [`flowtrial_workflow::ResolvedWorkflows`] and does one of two
//! things with them:
//!
//! - [`WorkflowInstaller`] writes them into a local repository (the `add`
//!   operation), compiling and committing on request, with full rollback on
//!   failure.
//! - [`TrialOrchestrator`] runs them end-to-end inside a disposable sandbox
//!   repository: install, compile, push, trigger, wait, harvest artifacts,
//!   persist results, optionally repeat, then clean up.
//!
//! The hosting platform and version control are reached only through
//! [`flowtrial_host`] traits; the compiler and security scanner are the
//! [`WorkflowCompiler`] and [`ContentScanner`] seams.

pub mod add;
pub mod artifacts;
pub mod changes;
pub mod compiler;
pub mod error;
pub mod install;
pub mod options;
pub mod orchestrator;
pub mod poll;
pub mod results;
pub mod sandbox;
pub mod secrets;
pub mod trigger;

pub use add::{AddOptions, AddReport, WorkflowInstaller};
pub use artifacts::{ClassifiedArtifacts, classify_artifacts};
pub use changes::ChangeTracker;
pub use compiler::{
    CommandCompiler, CommandScanner, CompiledWorkflow, ContentScanner, WorkflowCompiler,
};
pub use error::{Result, TrialError};
pub use options::{TrialMode, TrialOptions};
pub use orchestrator::{
    CycleReport, TrialOrchestrator, TrialOutcome, TrialPlan, TrialReport, repeat_cycles,
};
pub use poll::{Dispatched, PollSettings, wait_for_run};
pub use results::{CombinedTrialResult, WorkflowTrialResult};
pub use sandbox::{AutoConfirm, Confirmer, SandboxManager, SandboxState};
pub use secrets::{EnvSecrets, SecretSource};
pub use trigger::{TriggerInput, parse_trigger_context};
