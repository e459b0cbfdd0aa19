//! Hosting service trait.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{CreateRepoOptions, PullRequest, RepoEdit, WorkflowEntry, WorkflowRun};

/// The hosting platform as consumed by the resolver and the orchestrator.
///
/// Every call is a single request/response. Implementations classify
/// failures into [`crate::HostError`] variants before returning.
#[async_trait]
pub trait HostingService: Send + Sync {
    /// Login of the authenticated user.
    async fn current_user(&self) -> Result<String>;

    /// Whether a repository exists and is visible.
    async fn repo_exists(&self, slug: &str) -> Result<bool>;

    /// Create a repository.
    async fn create_repo(&self, slug: &str, options: &CreateRepoOptions) -> Result<()>;

    /// Delete a repository.
    async fn delete_repo(&self, slug: &str) -> Result<()>;

    /// Change repository settings.
    async fn edit_repo(&self, slug: &str, edit: &RepoEdit) -> Result<()>;

    /// Name of the default branch.
    async fn default_branch(&self, slug: &str) -> Result<String>;

    /// Resolve a branch, tag, or SHA to a commit SHA.
    async fn resolve_ref(&self, slug: &str, git_ref: &str) -> Result<String>;

    /// Raw bytes of a file at a ref.
    async fn fetch_file(&self, slug: &str, path: &str, git_ref: &str) -> Result<Vec<u8>>;

    /// Names of the repository's secrets.
    async fn list_secrets(&self, slug: &str) -> Result<Vec<String>>;

    /// Create or replace a secret. The value is opaque to the caller.
    async fn set_secret(&self, slug: &str, name: &str, value: &str) -> Result<()>;

    /// Workflows registered in the repository.
    async fn list_workflows(&self, slug: &str) -> Result<Vec<WorkflowEntry>>;

    /// Disable a workflow by id or file name.
    async fn disable_workflow(&self, slug: &str, workflow: &str) -> Result<()>;

    /// Trigger a manual run of a workflow file on a ref.
    async fn dispatch_workflow(
        &self,
        slug: &str,
        workflow_file: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Most recent manually dispatched run of a workflow file, if any.
    async fn latest_run(&self, slug: &str, workflow_file: &str) -> Result<Option<WorkflowRun>>;

    /// Current state of a run.
    async fn run_status(&self, slug: &str, run_id: u64) -> Result<WorkflowRun>;

    /// Download and unpack all artifacts of a run into `dest`.
    async fn download_artifacts(&self, slug: &str, run_id: u64, dest: &Path) -> Result<()>;

    /// Open pull requests.
    async fn list_pull_requests(&self, slug: &str) -> Result<Vec<PullRequest>>;

    /// Merge a pull request.
    async fn merge_pull_request(&self, slug: &str, number: u64) -> Result<()>;
}

/// A shared hosting service handle.
pub type SharedHost = Arc<dyn HostingService>;
