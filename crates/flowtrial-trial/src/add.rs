//! Installing resolved workflows into a local repository.
//!
//! Every write goes through a [`ChangeTracker`]. When any step fails
//! (an existing file, a scan finding, a compile error, a failed commit) the
//! tracker is rolled back before the error is returned, so the repository is
//! left as it was found.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowtrial_host::SharedVcs;
use flowtrial_workflow::ResolvedWorkflows;

use crate::Result;
use crate::TrialError;
use crate::changes::ChangeTracker;
use crate::compiler::{ContentScanner, WorkflowCompiler, lock_file_for};
use crate::install::{InstallPlan, ensure_gitattributes};

/// Options for [`WorkflowInstaller::add`].
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Overwrite workflow files that already exist.
    pub force: bool,
    /// Stage and commit the written files.
    pub commit: bool,
    /// Workflow directory, relative to the repository root.
    pub workflows_dir: PathBuf,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            force: false,
            commit: false,
            workflows_dir: PathBuf::from(".github/workflows"),
        }
    }
}

/// What an add did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Workflows written.
    pub installed: Vec<String>,
    /// Workflows left alone because they already existed.
    pub skipped: Vec<String>,
    /// Files created or modified, relative to the repository root.
    pub files: Vec<PathBuf>,
    /// Whether a commit was made.
    pub committed: bool,
}

/// Writes, scans, compiles, and commits workflows in a local repository.
pub struct WorkflowInstaller {
    vcs: SharedVcs,
    compiler: Option<Arc<dyn WorkflowCompiler>>,
    scanner: Option<Arc<dyn ContentScanner>>,
}

impl WorkflowInstaller {
    pub fn new(vcs: SharedVcs) -> Self {
        Self {
            vcs,
            compiler: None,
            scanner: None,
        }
    }

    /// Compile each installed workflow.
    pub fn with_compiler(mut self, compiler: Arc<dyn WorkflowCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Scan every document before it is written.
    pub fn with_scanner(mut self, scanner: Arc<dyn ContentScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Install `resolved` into the repository at `repo_dir`.
    pub async fn add(
        &self,
        repo_dir: &Path,
        resolved: &ResolvedWorkflows,
        options: &AddOptions,
    ) -> Result<AddReport> {
        let mut tracker = ChangeTracker::new(repo_dir);
        match self.add_tracked(&mut tracker, resolved, options).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let touched = tracker.all().len();
                match tracker.rollback().await {
                    Ok(()) if touched > 0 => {
                        tracing::info!(files = touched, "Rolled back partial install")
                    }
                    Ok(()) => {}
                    Err(rollback) => {
                        tracing::error!(error = %rollback, "Rollback failed; repository may be partially modified")
                    }
                }
                Err(e)
            }
        }
    }

    async fn add_tracked(
        &self,
        tracker: &mut ChangeTracker,
        resolved: &ResolvedWorkflows,
        options: &AddOptions,
    ) -> Result<AddReport> {
        let plan = InstallPlan {
            workflows_dir: &options.workflows_dir,
            simulate_repo: None,
            scanner: self.scanner.as_deref(),
        };
        let mut report = AddReport::default();
        let mut installed = Vec::new();

        for workflow in &resolved.workflows {
            let path = plan.workflow_path(workflow);
            let absolute = tracker.root().join(&path);
            if absolute.exists() && !options.force {
                if resolved.has_wildcard {
                    tracing::warn!(workflow = %workflow.name(), path = %path.display(), "Workflow exists, skipping");
                    report.skipped.push(workflow.name().to_string());
                    continue;
                }
                return Err(TrialError::AlreadyExists { path: absolute });
            }
            plan.install(tracker, workflow).await?;
            installed.push(path);
            report.installed.push(workflow.name().to_string());
        }

        if let Some(compiler) = &self.compiler
            && !installed.is_empty()
        {
            if let Err(e) = ensure_gitattributes(tracker).await {
                tracing::warn!(error = %e, "Could not update .gitattributes");
            }
            for path in &installed {
                tracker.track(&lock_file_for(path)).await?;
                compiler.compile(tracker.root(), std::slice::from_ref(path)).await?;
            }
        }

        report.files = tracker
            .all()
            .into_iter()
            .filter(|p| tracker.root().join(p).exists())
            .collect();

        if options.commit && !report.files.is_empty() {
            tracker.stage(&*self.vcs).await?;
            let message = format!("Add agentic workflows: {}", report.installed.join(", "));
            report.committed = self.vcs.commit(tracker.root(), &message).await?;
        }

        tracing::info!(
            installed = report.installed.len(),
            skipped = report.skipped.len(),
            committed = report.committed,
            "Add complete"
        );
        Ok(report)
    }
}
