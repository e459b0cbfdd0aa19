//! In-memory hosting service and version control for tests.
//!
//! [`MockHost`] keeps repositories, files, secrets, workflows, runs and pull
//! requests in memory and records every call. Runs are scripted with
//! [`MockRun`]: each dispatch consumes the next script (or a default
//! immediate success). [`MockVcs`] records version-control calls and
//! materialises clones as plain directories.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::service::HostingService;
use crate::types::{
    CreateRepoOptions, PullRequest, RepoEdit, RunConclusion, RunStatus, WorkflowEntry,
    WorkflowRun,
};
use crate::vcs::VersionControl;
use crate::{HostError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted runs
// ─────────────────────────────────────────────────────────────────────────────

/// Script for the run created by one dispatch.
#[derive(Debug, Clone)]
pub struct MockRun {
    /// Number of status queries answered with `in_progress` before completing.
    pub polls_before_complete: u32,
    /// Conclusion reported once completed.
    pub conclusion: RunConclusion,
    /// Files (relative path, bytes) produced as artifacts.
    pub artifacts: Vec<(String, Vec<u8>)>,
    /// Pull requests (number, title) the run opens.
    pub pull_requests: Vec<(u64, String)>,
    /// Creation time reported for the run.
    pub created_at: Option<DateTime<Utc>>,
}

impl MockRun {
    /// A run that completes successfully on the first status query.
    pub fn success() -> Self {
        Self {
            polls_before_complete: 0,
            conclusion: RunConclusion::Success,
            artifacts: Vec::new(),
            pull_requests: Vec::new(),
            created_at: None,
        }
    }

    /// A run that completes with a failure.
    pub fn failure() -> Self {
        Self {
            conclusion: RunConclusion::Failure,
            ..Self::success()
        }
    }

    /// A run that never reaches a terminal state.
    pub fn never_completes() -> Self {
        Self {
            polls_before_complete: u32::MAX,
            ..Self::success()
        }
    }

    /// Answer `in_progress` this many times first.
    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls_before_complete = polls;
        self
    }

    /// Add an artifact file.
    pub fn with_artifact(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.artifacts.push((path.into(), content.into()));
        self
    }

    /// Report this creation time.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Open a pull request when dispatched.
    pub fn with_pull_request(mut self, number: u64, title: impl Into<String>) -> Self {
        self.pull_requests.push((number, title.into()));
        self
    }
}

#[derive(Debug)]
struct RunRecord {
    id: u64,
    slug: String,
    workflow_file: String,
    polls_left: u32,
    script: MockRun,
}

impl RunRecord {
    fn snapshot(&self) -> WorkflowRun {
        let done = self.polls_left == 0;
        WorkflowRun {
            id: self.id,
            status: if done {
                RunStatus::Completed
            } else {
                RunStatus::InProgress
            },
            conclusion: done.then(|| self.script.conclusion.clone()),
            url: format!("https://github.com/{}/actions/runs/{}", self.slug, self.id),
            created_at: self.script.created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MockHost
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockRepo {
    default_branch: String,
    files: BTreeMap<String, Vec<u8>>,
    refs: BTreeMap<String, String>,
    secrets: BTreeMap<String, String>,
    workflows: Vec<WorkflowEntry>,
    pull_requests: Vec<PullRequest>,
    discussions: bool,
}

impl MockRepo {
    fn new() -> Self {
        Self {
            default_branch: "main".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    user: String,
    repos: BTreeMap<String, MockRepo>,
    scripted_runs: VecDeque<MockRun>,
    runs: Vec<RunRecord>,
    merged: Vec<(String, u64)>,
    failing: BTreeSet<String>,
    calls: Vec<String>,
    next_run_id: u64,
}

/// In-memory [`HostingService`].
#[derive(Debug)]
pub struct MockHost {
    state: Mutex<HostState>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    /// Create an empty host whose authenticated user is `mock-user`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                user: "mock-user".to_string(),
                next_run_id: 1000,
                ..Default::default()
            }),
        }
    }

    /// Set the authenticated user.
    pub fn with_user(self, login: impl Into<String>) -> Self {
        self.state.lock().unwrap().user = login.into();
        self
    }

    /// Add an empty repository.
    pub fn with_repo(self, slug: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .repos
            .entry(slug.into())
            .or_insert_with(MockRepo::new);
        self
    }

    /// Add a file (visible at every ref), creating the repository if needed.
    pub fn with_file(
        self,
        slug: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .repos
            .entry(slug.into())
            .or_insert_with(MockRepo::new)
            .files
            .insert(path.into(), content.into());
        self
    }

    /// Make `git_ref` resolvable to `sha`.
    pub fn with_ref(
        self,
        slug: impl Into<String>,
        git_ref: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .repos
            .entry(slug.into())
            .or_insert_with(MockRepo::new)
            .refs
            .insert(git_ref.into(), sha.into());
        self
    }

    /// Register a workflow in a repository.
    pub fn with_workflow(self, slug: impl Into<String>, path: impl Into<String>) -> Self {
        let mut state = self.state.lock().unwrap();
        let repo = state.repos.entry(slug.into()).or_insert_with(MockRepo::new);
        let path = path.into();
        let id = repo.workflows.len() as u64 + 1;
        repo.workflows.push(WorkflowEntry {
            id,
            name: path.rsplit('/').next().unwrap_or(&path).to_string(),
            path,
            state: "active".to_string(),
        });
        drop(state);
        self
    }

    /// Add an existing secret.
    pub fn with_secret(self, slug: impl Into<String>, name: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .repos
            .entry(slug.into())
            .or_insert_with(MockRepo::new)
            .secrets
            .insert(name.into(), String::new());
        self
    }

    /// Queue the script for the next dispatched run.
    pub fn with_run(self, run: MockRun) -> Self {
        self.state.lock().unwrap().scripted_runs.push_back(run);
        self
    }

    /// Make every call to `operation` fail with [`HostError::Unknown`].
    pub fn fail_on(self, operation: impl Into<String>) -> Self {
        self.state.lock().unwrap().failing.insert(operation.into());
        self
    }

    /// All calls made so far, as `"operation arg..."` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls to an operation.
    pub fn call_count(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix) || c.as_str() == operation)
            .count()
    }

    /// Whether a repository currently exists.
    pub fn has_repo(&self, slug: &str) -> bool {
        self.state.lock().unwrap().repos.contains_key(slug)
    }

    /// Secret names of a repository.
    pub fn secret_names(&self, slug: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .map(|r| r.secrets.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Workflow file names that are disabled.
    pub fn disabled_workflows(&self, slug: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .map(|r| {
                r.workflows
                    .iter()
                    .filter(|w| !w.is_active())
                    .map(|w| w.file_name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pull requests merged so far.
    pub fn merged_pull_requests(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().merged.clone()
    }

    /// Whether discussions were enabled on a repository.
    pub fn discussions_enabled(&self, slug: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .is_some_and(|r| r.discussions)
    }

    fn record(&self, operation: &str, detail: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", operation, detail));
        if state.failing.contains(operation) {
            return Err(HostError::Unknown(format!("{} failed (mock)", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl HostingService for MockHost {
    async fn current_user(&self) -> Result<String> {
        self.record("current_user", String::new())?;
        Ok(self.state.lock().unwrap().user.clone())
    }

    async fn repo_exists(&self, slug: &str) -> Result<bool> {
        self.record("repo_exists", slug.to_string())?;
        Ok(self.has_repo(slug))
    }

    async fn create_repo(&self, slug: &str, options: &CreateRepoOptions) -> Result<()> {
        self.record("create_repo", slug.to_string())?;
        let mut state = self.state.lock().unwrap();
        if state.repos.contains_key(slug) {
            return Err(HostError::Conflict(format!("{} already exists", slug)));
        }
        let mut repo = MockRepo::new();
        if options.seed_readme {
            repo.files.insert("README.md".to_string(), b"# sandbox\n".to_vec());
        }
        state.repos.insert(slug.to_string(), repo);
        Ok(())
    }

    async fn delete_repo(&self, slug: &str) -> Result<()> {
        self.record("delete_repo", slug.to_string())?;
        match self.state.lock().unwrap().repos.remove(slug) {
            Some(_) => Ok(()),
            None => Err(HostError::NotFound(slug.to_string())),
        }
    }

    async fn edit_repo(&self, slug: &str, edit: &RepoEdit) -> Result<()> {
        self.record("edit_repo", slug.to_string())?;
        let mut state = self.state.lock().unwrap();
        let repo = state
            .repos
            .get_mut(slug)
            .ok_or_else(|| HostError::NotFound(slug.to_string()))?;
        if let Some(enable) = edit.enable_discussions {
            repo.discussions = enable;
        }
        Ok(())
    }

    async fn default_branch(&self, slug: &str) -> Result<String> {
        self.record("default_branch", slug.to_string())?;
        self.state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .map(|r| r.default_branch.clone())
            .ok_or_else(|| HostError::NotFound(slug.to_string()))
    }

    async fn resolve_ref(&self, slug: &str, git_ref: &str) -> Result<String> {
        self.record("resolve_ref", format!("{}@{}", slug, git_ref))?;
        self.state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .and_then(|r| r.refs.get(git_ref).cloned())
            .ok_or_else(|| HostError::NotFound(format!("{}@{}", slug, git_ref)))
    }

    async fn fetch_file(&self, slug: &str, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        self.record("fetch_file", format!("{}/{}@{}", slug, path, git_ref))?;
        let state = self.state.lock().unwrap();
        let repo = state
            .repos
            .get(slug)
            .ok_or_else(|| HostError::NotFound(slug.to_string()))?;
        repo.files
            .get(path)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("{}/{}", slug, path)))
    }

    async fn list_secrets(&self, slug: &str) -> Result<Vec<String>> {
        self.record("list_secrets", slug.to_string())?;
        Ok(self.secret_names(slug))
    }

    async fn set_secret(&self, slug: &str, name: &str, value: &str) -> Result<()> {
        self.record("set_secret", format!("{} {}", slug, name))?;
        let mut state = self.state.lock().unwrap();
        let repo = state
            .repos
            .get_mut(slug)
            .ok_or_else(|| HostError::NotFound(slug.to_string()))?;
        repo.secrets.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn list_workflows(&self, slug: &str) -> Result<Vec<WorkflowEntry>> {
        self.record("list_workflows", slug.to_string())?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .map(|r| r.workflows.clone())
            .unwrap_or_default())
    }

    async fn disable_workflow(&self, slug: &str, workflow: &str) -> Result<()> {
        self.record("disable_workflow", format!("{} {}", slug, workflow))?;
        let mut state = self.state.lock().unwrap();
        let repo = state
            .repos
            .get_mut(slug)
            .ok_or_else(|| HostError::NotFound(slug.to_string()))?;
        let entry = repo
            .workflows
            .iter_mut()
            .find(|w| w.id.to_string() == workflow || w.file_name() == workflow)
            .ok_or_else(|| HostError::NotFound(workflow.to_string()))?;
        entry.state = "disabled_manually".to_string();
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        slug: &str,
        workflow_file: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<()> {
        let rendered: Vec<String> = inputs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        self.record(
            "dispatch_workflow",
            format!("{} {}@{} {}", slug, workflow_file, git_ref, rendered.join(",")),
        )?;
        let mut state = self.state.lock().unwrap();
        if !state.repos.contains_key(slug) {
            return Err(HostError::NotFound(slug.to_string()));
        }
        let script = state.scripted_runs.pop_front().unwrap_or_else(MockRun::success);
        let id = state.next_run_id;
        state.next_run_id += 1;
        if let Some(repo) = state.repos.get_mut(slug) {
            for (number, title) in &script.pull_requests {
                repo.pull_requests.push(PullRequest {
                    number: *number,
                    title: title.clone(),
                    head_ref: format!("run-{}", id),
                    created_at: None,
                });
            }
        }
        state.runs.push(RunRecord {
            id,
            slug: slug.to_string(),
            workflow_file: workflow_file.to_string(),
            polls_left: script.polls_before_complete,
            script,
        });
        Ok(())
    }

    async fn latest_run(&self, slug: &str, workflow_file: &str) -> Result<Option<WorkflowRun>> {
        self.record("latest_run", format!("{} {}", slug, workflow_file))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .runs
            .iter()
            .rev()
            .find(|r| r.slug == slug && r.workflow_file == workflow_file)
            .map(RunRecord::snapshot))
    }

    async fn run_status(&self, slug: &str, run_id: u64) -> Result<WorkflowRun> {
        self.record("run_status", format!("{} {}", slug, run_id))?;
        let mut state = self.state.lock().unwrap();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.slug == slug)
            .ok_or_else(|| HostError::NotFound(format!("run {}", run_id)))?;
        let snapshot = run.snapshot();
        if run.polls_left > 0 && run.polls_left != u32::MAX {
            run.polls_left -= 1;
        }
        Ok(snapshot)
    }

    async fn download_artifacts(&self, slug: &str, run_id: u64, dest: &Path) -> Result<()> {
        self.record("download_artifacts", format!("{} {}", slug, run_id))?;
        let artifacts = {
            let state = self.state.lock().unwrap();
            let run = state
                .runs
                .iter()
                .find(|r| r.id == run_id && r.slug == slug)
                .ok_or_else(|| HostError::NotFound(format!("run {}", run_id)))?;
            run.script.artifacts.clone()
        };
        if artifacts.is_empty() {
            return Err(HostError::NoArtifacts(run_id));
        }
        for (rel, bytes) in artifacts {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(())
    }

    async fn list_pull_requests(&self, slug: &str) -> Result<Vec<PullRequest>> {
        self.record("list_pull_requests", slug.to_string())?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .repos
            .get(slug)
            .map(|r| r.pull_requests.clone())
            .unwrap_or_default())
    }

    async fn merge_pull_request(&self, slug: &str, number: u64) -> Result<()> {
        self.record("merge_pull_request", format!("{} {}", slug, number))?;
        let mut state = self.state.lock().unwrap();
        let repo = state
            .repos
            .get_mut(slug)
            .ok_or_else(|| HostError::NotFound(slug.to_string()))?;
        let before = repo.pull_requests.len();
        repo.pull_requests.retain(|pr| pr.number != number);
        if repo.pull_requests.len() == before {
            return Err(HostError::NotFound(format!("pull request {}", number)));
        }
        state.merged.push((slug.to_string(), number));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MockVcs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct VcsState {
    origin: Option<String>,
    clone_files: BTreeMap<String, Vec<u8>>,
    commit_result: bool,
    push_conflict: bool,
    calls: Vec<String>,
}

/// Recording [`VersionControl`] that never touches a real repository.
#[derive(Debug)]
pub struct MockVcs {
    state: Mutex<VcsState>,
}

impl Default for MockVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVcs {
    /// Create a recorder whose commits always find something to commit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VcsState {
                origin: None,
                clone_files: BTreeMap::new(),
                commit_result: true,
                push_conflict: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Report this slug as the `origin` of every directory.
    pub fn with_origin(self, slug: impl Into<String>) -> Self {
        self.state.lock().unwrap().origin = Some(slug.into());
        self
    }

    /// Write this file into every clone.
    pub fn with_clone_file(self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.state
            .lock()
            .unwrap()
            .clone_files
            .insert(path.into(), content.into());
        self
    }

    /// Make every commit report "nothing to commit".
    pub fn with_nothing_to_commit(self) -> Self {
        self.state.lock().unwrap().commit_result = false;
        self
    }

    /// Reject every push as a conflict.
    pub fn with_push_conflict(self) -> Self {
        self.state.lock().unwrap().push_conflict = true;
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls to an operation.
    pub fn call_count(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix) || c.as_str() == operation)
            .count()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl VersionControl for MockVcs {
    async fn clone_repo(&self, slug: &str, dest: &Path) -> Result<()> {
        self.record(format!("clone_repo {}", slug));
        std::fs::create_dir_all(dest)?;
        let files = self.state.lock().unwrap().clone_files.clone();
        for (rel, bytes) in files {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(())
    }

    async fn origin_slug(&self, repo_dir: &Path) -> Result<Option<String>> {
        self.record(format!("origin_slug {}", repo_dir.display()));
        Ok(self.state.lock().unwrap().origin.clone())
    }

    async fn add_paths(&self, _repo_dir: &Path, paths: &[PathBuf]) -> Result<()> {
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        self.record(format!("add_paths {}", rendered.join(",")));
        Ok(())
    }

    async fn commit(&self, _repo_dir: &Path, message: &str) -> Result<bool> {
        self.record(format!("commit {}", message));
        Ok(self.state.lock().unwrap().commit_result)
    }

    async fn pull_and_push(&self, _repo_dir: &Path) -> Result<()> {
        self.record("pull_and_push".to_string());
        if self.state.lock().unwrap().push_conflict {
            return Err(HostError::Conflict("push rejected (mock)".to_string()));
        }
        Ok(())
    }

    async fn force_push_tree(
        &self,
        source_slug: &str,
        target_slug: &str,
        branch: &str,
        _scratch: &Path,
    ) -> Result<()> {
        self.record(format!(
            "force_push_tree {} {} {}",
            source_slug, target_slug, branch
        ));
        Ok(())
    }
}
