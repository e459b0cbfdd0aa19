//! Error types for installation and trial orchestration.

use std::path::PathBuf;
use std::time::Duration;

use flowtrial_host::HostError;
use flowtrial_workflow::WorkflowError;
use thiserror::Error;

/// Result type alias using the trial error type.
pub type Result<T> = std::result::Result<T, TrialError>;

/// Errors that can occur while installing workflows or running trials.
#[derive(Debug, Error)]
pub enum TrialError {
    /// Conflicting or incomplete trial options.
    #[error("invalid trial options: {0}")]
    Options(String),

    /// Sandbox creation, deletion, or seeding failed.
    #[error("sandbox {repo}: {message}")]
    Sandbox { repo: String, message: String },

    /// The external compiler rejected a workflow.
    #[error("compilation failed for {workflow}: {message}")]
    Compile { workflow: String, message: String },

    /// The security scanner reported findings.
    #[error("security scan rejected {workflow}: {}", findings.join("; "))]
    Scan {
        workflow: String,
        findings: Vec<String>,
    },

    /// A workflow file is already present and overwriting was not requested.
    #[error("{} already exists; use --force to overwrite", path.display())]
    AlreadyExists { path: PathBuf },

    /// A write target lies outside the working copy.
    #[error("refusing to write {} outside the repository", path.display())]
    UnsafePath { path: PathBuf },

    /// A push was still rejected after pulling once.
    #[error("push to {repo} rejected after pulling: {message}")]
    PushConflict { repo: String, message: String },

    /// Triggering a run failed, or no run appeared.
    #[error("failed to trigger {workflow} in {repo}: {message}")]
    Dispatch {
        workflow: String,
        repo: String,
        message: String,
    },

    /// A run finished without succeeding.
    #[error("run {run_id} of {workflow} finished with {conclusion}: {url}")]
    RunFailed {
        workflow: String,
        run_id: u64,
        conclusion: String,
        url: String,
    },

    /// A run did not reach a terminal state in time.
    #[error("run {run_id} did not finish within {waited:?}; inspect it manually")]
    Timeout { run_id: u64, waited: Duration },

    /// A workflow has no manual trigger, so it cannot be trialled.
    #[error("workflow {0} cannot be triggered manually; add workflow_dispatch to its `on` section")]
    NoManualTrigger(String),

    /// Cancelled before the next step started.
    #[error("trial cancelled")]
    Cancelled,

    /// Hosting service or version-control failure.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Workflow resolution failure.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Local file system failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Result serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrialError {
    /// Map a failed push to [`TrialError::PushConflict`], passing other
    /// errors through.
    pub(crate) fn from_push(repo: &str, err: HostError) -> Self {
        match err {
            HostError::Conflict(message) => TrialError::PushConflict {
                repo: repo.to_string(),
                message,
            },
            other => TrialError::Host(other),
        }
    }
}
