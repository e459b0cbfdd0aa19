//! Trial orchestration.
//!
//! One invocation:
//!
//! 1. check every workflow can be dispatched manually, pick the mode
//! 2. ensure the sandbox (and seed it from the clone source in clone mode)
//! 3. configure engine secrets and discussions (advisory)
//! 4. run `1 + repeat_count` independent cycles, then clean up once
//!
//! A cycle clones the sandbox into a scoped temporary directory, installs
//! and compiles every workflow, pushes, then triggers each workflow in turn,
//! waits for it, harvests artifacts and writes result files. Result files
//! are finally committed into the sandbox as well. Workflows within a cycle
//! never run concurrently.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use flowtrial_host::{HostError, RepoEdit, SharedHost, SharedVcs};
use flowtrial_workflow::{ResolvedWorkflow, ResolvedWorkflows};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{classify_artifacts, is_populated};
use crate::changes::ChangeTracker;
use crate::compiler::{ContentScanner, WorkflowCompiler, lock_file_for};
use crate::install::{InstallPlan, ensure_gitattributes};
use crate::options::{TrialMode, TrialOptions};
use crate::poll::{Dispatched, PollSettings, wait_for_run};
use crate::results::{
    CombinedTrialResult, WorkflowTrialResult, combined_file_name, cycle_id, result_file_name,
    write_json,
};
use crate::sandbox::{Confirmer, SandboxManager};
use crate::secrets::{DEFAULT_ENGINE, EnvSecrets, SecretSource, ensure_engine_secrets};
use crate::trigger::parse_trigger_context;
use crate::{Result, TrialError};

/// Directory inside the sandbox that receives result files.
pub const SANDBOX_RESULTS_DIR: &str = "trials";

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// What a dry run would do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialPlan {
    pub mode: TrialMode,
    pub host_repo: String,
    pub workflows: Vec<String>,
    pub cycles: u32,
    pub results_dir: PathBuf,
}

impl fmt::Display for TrialPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode:       {}", self.mode)?;
        writeln!(f, "Sandbox:    {}", self.host_repo)?;
        writeln!(f, "Workflows:  {}", self.workflows.join(", "))?;
        writeln!(f, "Cycles:     {}", self.cycles)?;
        write!(f, "Results:    {}", self.results_dir.display())
    }
}

/// Results of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u32,
    pub cycle_id: String,
    pub results: Vec<WorkflowTrialResult>,
    /// Local result files written.
    pub files: Vec<PathBuf>,
}

/// Results of every cycle of an invocation.
#[derive(Debug, Clone)]
pub struct TrialReport {
    pub mode: TrialMode,
    pub host_repo: String,
    pub cycles: Vec<CycleReport>,
}

/// Outcome of [`TrialOrchestrator::run`].
#[derive(Debug, Clone)]
pub enum TrialOutcome {
    /// Dry run: nothing was changed.
    Planned(TrialPlan),
    /// All cycles succeeded.
    Completed(TrialReport),
}

// ─────────────────────────────────────────────────────────────────────────────
// Repeat driver
// ─────────────────────────────────────────────────────────────────────────────

/// Run `total` independent cycles, then `cleanup` exactly once.
///
/// A failing cycle does not stop the next one. The first error is returned
/// after cleanup. Cancellation is checked before each cycle starts; a cycle
/// already running is not interrupted.
pub async fn repeat_cycles<T, F, Fut, C, CFut>(
    total: u32,
    cancel: &CancellationToken,
    mut cycle: F,
    cleanup: C,
) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = ()>,
{
    let mut completed = Vec::with_capacity(total as usize);
    let mut first_error = None;

    for n in 1..=total {
        if cancel.is_cancelled() {
            tracing::warn!(cycle = n, total, "Cancelled before cycle start");
            first_error.get_or_insert(TrialError::Cancelled);
            break;
        }
        tracing::info!(cycle = n, total, "Starting trial cycle");
        match cycle(n).await {
            Ok(value) => completed.push(value),
            Err(e) => {
                tracing::error!(cycle = n, total, error = %e, "Trial cycle failed");
                first_error.get_or_insert(e);
            }
        }
    }

    cleanup().await;

    match first_error {
        Some(e) => Err(e),
        None => Ok(completed),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

struct CycleContext<'a> {
    workflows: &'a [ResolvedWorkflow],
    options: &'a TrialOptions,
    mode: &'a TrialMode,
    host_repo: &'a str,
    branch: &'a str,
    inputs: BTreeMap<String, String>,
}

impl CycleContext<'_> {
    fn label(&self) -> &str {
        self.mode.result_label(self.host_repo)
    }
}

/// Drives trials against a sandbox repository.
pub struct TrialOrchestrator {
    host: SharedHost,
    vcs: SharedVcs,
    compiler: Arc<dyn WorkflowCompiler>,
    scanner: Arc<dyn ContentScanner>,
    sandbox: SandboxManager,
    secrets: Arc<dyn SecretSource>,
    web_url: String,
}

impl TrialOrchestrator {
    pub fn new(
        host: SharedHost,
        vcs: SharedVcs,
        compiler: Arc<dyn WorkflowCompiler>,
        scanner: Arc<dyn ContentScanner>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            sandbox: SandboxManager::new(host.clone(), confirmer),
            host,
            vcs,
            compiler,
            scanner,
            secrets: Arc::new(EnvSecrets),
            web_url: "https://github.com".to_string(),
        }
    }

    /// Base URL used when pointing the operator at the sandbox.
    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        self.web_url = web_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Read engine secrets from somewhere other than the environment.
    pub fn with_secret_source(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Run (or, with `dry_run`, plan) a trial of `resolved`.
    ///
    /// `current_repo` is the operator's working repository, used by the
    /// default mode.
    pub async fn run(
        &self,
        resolved: &ResolvedWorkflows,
        options: &TrialOptions,
        current_repo: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TrialOutcome> {
        options.validate()?;
        if resolved.is_empty() {
            return Err(TrialError::Options("no workflows to trial".to_string()));
        }
        if let Some(wf) = resolved.workflows.iter().find(|w| !w.has_workflow_dispatch) {
            return Err(TrialError::NoManualTrigger(wf.name().to_string()));
        }

        let mode = TrialMode::select(options, current_repo)?;
        let mut inputs = BTreeMap::new();
        if let Some(reference) = &options.trigger_context {
            let input = parse_trigger_context(reference)?;
            inputs.insert(input.name, input.value);
        }

        let host_repo = match &options.host_repo {
            Some(slug) => slug.clone(),
            None => {
                let user = self.host.current_user().await?;
                format!("{}/{}", user, options.host_repo_name)
            }
        };
        if let TrialMode::Clone { source } = &mode
            && source.eq_ignore_ascii_case(&host_repo)
        {
            return Err(TrialError::Options(
                "the clone source and the sandbox must be different repositories".to_string(),
            ));
        }

        if options.dry_run {
            let plan = TrialPlan {
                mode,
                host_repo,
                workflows: resolved.names(),
                cycles: options.total_cycles(),
                results_dir: options.results_dir.clone(),
            };
            tracing::info!(sandbox = %plan.host_repo, "Dry run, nothing changed");
            return Ok(TrialOutcome::Planned(plan));
        }

        if cancel.is_cancelled() {
            return Err(TrialError::Cancelled);
        }

        tracing::info!(sandbox = %host_repo, mode = %mode, "Starting trial");
        self.sandbox
            .ensure(
                &host_repo,
                options.force_delete_host_repo_before,
                mode.seeds_content(),
            )
            .await?;
        let branch = self.host.default_branch(&host_repo).await?;

        if let TrialMode::Clone { source } = &mode {
            self.seed_from(source, &host_repo, &branch, resolved).await?;
        }
        self.enable_discussions(&host_repo).await;

        let engines: BTreeSet<String> = match &options.engine {
            Some(engine) => BTreeSet::from([engine.clone()]),
            None => resolved
                .workflows
                .iter()
                .map(|w| w.engine.clone().unwrap_or_else(|| DEFAULT_ENGINE.to_string()))
                .collect(),
        };
        ensure_engine_secrets(&*self.host, &host_repo, &engines, &*self.secrets).await;

        let ctx = CycleContext {
            workflows: &resolved.workflows,
            options,
            mode: &mode,
            host_repo: &host_repo,
            branch: &branch,
            inputs,
        };
        let ctx = &ctx;
        let cycles = repeat_cycles(
            options.total_cycles(),
            cancel,
            move |n| self.run_cycle(ctx, n),
            move || self.cleanup(ctx.host_repo, ctx.options),
        )
        .await?;

        Ok(TrialOutcome::Completed(TrialReport {
            mode: mode.clone(),
            host_repo: host_repo.clone(),
            cycles,
        }))
    }

    async fn seed_from(
        &self,
        source: &str,
        host_repo: &str,
        branch: &str,
        resolved: &ResolvedWorkflows,
    ) -> Result<()> {
        let scratch = tempfile::Builder::new().prefix("flowtrial-seed-").tempdir()?;
        self.vcs
            .force_push_tree(source, host_repo, branch, scratch.path())
            .await
            .map_err(|e| TrialError::Sandbox {
                repo: host_repo.to_string(),
                message: format!("seeding from {} failed: {}", source, e),
            })?;

        let keep: HashSet<String> = resolved
            .workflows
            .iter()
            .flat_map(|w| [w.lock_file_name(), w.file_name()])
            .collect();
        for entry in self.host.list_workflows(host_repo).await? {
            if !entry.is_active() || keep.contains(entry.file_name()) {
                continue;
            }
            match self
                .host
                .disable_workflow(host_repo, &entry.id.to_string())
                .await
            {
                Ok(()) => tracing::info!(workflow = %entry.path, "Disabled unrelated workflow"),
                Err(e) => {
                    tracing::warn!(workflow = %entry.path, error = %e, "Could not disable workflow")
                }
            }
        }
        Ok(())
    }

    async fn enable_discussions(&self, host_repo: &str) {
        let edit = RepoEdit {
            enable_discussions: Some(true),
        };
        if let Err(e) = self.host.edit_repo(host_repo, &edit).await {
            tracing::warn!(repo = host_repo, error = %e, "Could not enable discussions");
        }
    }

    async fn cleanup(&self, host_repo: &str, options: &TrialOptions) {
        if options.delete_host_repo_after {
            if let Err(e) = self.sandbox.delete(host_repo).await {
                tracing::warn!(repo = host_repo, error = %e, "Sandbox cleanup failed");
            }
        } else {
            tracing::info!(
                repo = host_repo,
                url = %format!("{}/{}", self.web_url, host_repo),
                "Sandbox kept for inspection"
            );
        }
    }

    async fn run_cycle(&self, ctx: &CycleContext<'_>, cycle: u32) -> Result<CycleReport> {
        let cycle_id = cycle_id(Utc::now(), cycle);
        let workdir = tempfile::Builder::new().prefix("flowtrial-").tempdir()?;
        let checkout = workdir.path().join("sandbox");
        self.vcs.clone_repo(ctx.host_repo, &checkout).await?;

        self.install_all(ctx, &checkout, &cycle_id).await?;

        let mut results = Vec::with_capacity(ctx.workflows.len());
        let mut files = Vec::new();
        for workflow in ctx.workflows {
            let result = self.execute(ctx, workflow).await?;
            let name = result_file_name(workflow.name(), ctx.label(), &cycle_id);
            files.push(write_json(&ctx.options.results_dir, &name, &result).await?);
            results.push(result);
        }

        if results.len() > 1 {
            let combined = CombinedTrialResult::new(results.clone());
            let name = combined_file_name(ctx.label(), &cycle_id);
            files.push(write_json(&ctx.options.results_dir, &name, &combined).await?);
        }

        self.publish_results(ctx.host_repo, &checkout, &files, &cycle_id)
            .await?;

        Ok(CycleReport {
            cycle,
            cycle_id,
            results,
            files,
        })
    }

    async fn install_all(&self, ctx: &CycleContext<'_>, checkout: &Path, cycle_id: &str) -> Result<()> {
        let mut tracker = ChangeTracker::new(checkout);
        if let Err(e) = ensure_gitattributes(&mut tracker).await {
            tracing::warn!(error = %e, "Could not update .gitattributes");
        }

        let plan = InstallPlan {
            workflows_dir: &ctx.options.workflows_dir,
            simulate_repo: ctx.mode.simulated_repo(),
            scanner: (!ctx.options.disable_security_scanner).then_some(self.scanner.as_ref()),
        };
        for workflow in ctx.workflows {
            let path = plan.install(&mut tracker, workflow).await?;
            tracker.track(&lock_file_for(&path)).await?;
            let compiled = self.compiler.compile(checkout, &[path]).await?;
            tracing::debug!(workflow = %workflow.name(), lock_files = ?compiled.lock_files, "Compiled workflow");
        }

        tracker.stage(&*self.vcs).await?;
        let names: Vec<&str> = ctx.workflows.iter().map(|w| w.name()).collect();
        let message = format!("Install {} for trial {}", names.join(", "), cycle_id);
        if self.vcs.commit(checkout, &message).await? {
            self.vcs
                .pull_and_push(checkout)
                .await
                .map_err(|e| TrialError::from_push(ctx.host_repo, e))?;
        } else {
            tracing::info!("Workflows already up to date in sandbox");
        }
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &CycleContext<'_>,
        workflow: &ResolvedWorkflow,
    ) -> Result<WorkflowTrialResult> {
        let lock = workflow.lock_file_name();
        let previous = self
            .host
            .latest_run(ctx.host_repo, &lock)
            .await?
            .map(|r| r.id);

        let dispatched = Dispatched::now(previous);
        self.host
            .dispatch_workflow(ctx.host_repo, &lock, ctx.branch, &ctx.inputs)
            .await
            .map_err(|e| TrialError::Dispatch {
                workflow: workflow.name().to_string(),
                repo: ctx.host_repo.to_string(),
                message: e.to_string(),
            })?;
        tracing::info!(workflow = %workflow.name(), repo = ctx.host_repo, "Triggered run");

        let settings = PollSettings {
            interval: ctx.options.poll_interval,
            timeout: ctx.options.timeout,
        };
        let run = wait_for_run(&*self.host, ctx.host_repo, &lock, dispatched, settings).await?;

        match &run.conclusion {
            Some(c) if c.is_success() => {}
            other => {
                return Err(TrialError::RunFailed {
                    workflow: workflow.name().to_string(),
                    run_id: run.id,
                    conclusion: other
                        .as_ref()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    url: run.url.clone(),
                });
            }
        }

        if ctx.options.auto_merge_prs {
            self.merge_pull_requests(ctx.host_repo, &run).await;
        }

        let artifact_dir = ctx
            .options
            .results_dir
            .join("artifacts")
            .join(run.id.to_string());
        if is_populated(&artifact_dir) {
            tracing::info!(dir = %artifact_dir.display(), "Artifacts already downloaded");
        } else {
            tokio::fs::create_dir_all(&artifact_dir).await?;
            match self
                .host
                .download_artifacts(ctx.host_repo, run.id, &artifact_dir)
                .await
            {
                Ok(()) => {}
                Err(HostError::NoArtifacts(id)) => {
                    tracing::warn!(run_id = id, "Run produced no artifacts");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let artifacts = classify_artifacts(&artifact_dir);
        Ok(WorkflowTrialResult::new(
            workflow.name(),
            run.id,
            run.url.clone(),
            artifacts,
        ))
    }

    async fn merge_pull_requests(&self, host_repo: &str, run: &flowtrial_host::WorkflowRun) {
        let pulls = match self.host.list_pull_requests(host_repo).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(repo = host_repo, error = %e, "Could not list pull requests");
                return;
            }
        };
        for pr in pulls {
            // Older pull requests were not created by this run
            if let (Some(opened), Some(started)) = (pr.created_at, run.created_at)
                && opened < started
            {
                continue;
            }
            match self.host.merge_pull_request(host_repo, pr.number).await {
                Ok(()) => tracing::info!(number = pr.number, title = %pr.title, "Merged pull request"),
                Err(e) => tracing::warn!(number = pr.number, error = %e, "Could not merge pull request"),
            }
        }
    }

    async fn publish_results(
        &self,
        host_repo: &str,
        checkout: &Path,
        files: &[PathBuf],
        cycle_id: &str,
    ) -> Result<()> {
        let dest = checkout.join(SANDBOX_RESULTS_DIR);
        tokio::fs::create_dir_all(&dest).await?;

        let mut staged = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            tokio::fs::copy(file, dest.join(name)).await?;
            staged.push(Path::new(SANDBOX_RESULTS_DIR).join(name));
        }
        if staged.is_empty() {
            return Ok(());
        }

        self.vcs.add_paths(checkout, &staged).await?;
        let message = format!("Add trial results {}", cycle_id);
        if !self.vcs.commit(checkout, &message).await? {
            tracing::info!("No new trial results to commit");
            return Ok(());
        }
        self.vcs
            .pull_and_push(checkout)
            .await
            .map_err(|e| TrialError::from_push(host_repo, e))?;
        tracing::info!(repo = host_repo, count = staged.len(), "Published trial results");
        Ok(())
    }
}
