//! CLI command handlers.

pub mod add;
pub mod trial;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use console::{Style, Term};
use flowtrial_config::FlowtrialConfig;
use flowtrial_host::{GhCli, GitCli, SharedHost, SharedVcs};
use flowtrial_trial::{CommandCompiler, CommandScanner, Confirmer};
use flowtrial_workflow::{ResolvedWorkflows, WorkflowResolver};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Project directory: local references and relative paths start here.
    pub project_dir: PathBuf,
    /// Merged configuration.
    pub config: FlowtrialConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn host(&self) -> SharedHost {
        let host = self.config.host();
        Arc::new(GhCli::new(host.gh.clone(), host.command_timeout()))
    }

    pub fn vcs(&self) -> SharedVcs {
        let host = self.config.host();
        Arc::new(GitCli::new(
            host.git.clone(),
            host.web_url.clone(),
            host.command_timeout(),
        ))
    }

    pub fn compiler(&self) -> Arc<CommandCompiler> {
        Arc::new(CommandCompiler::new(
            self.config.compiler().command,
            self.config.host().command_timeout(),
        ))
    }

    pub fn scanner(&self) -> Arc<CommandScanner> {
        Arc::new(CommandScanner::new(
            self.config.scanner().command,
            self.config.host().command_timeout(),
        ))
    }

    /// `path` made absolute against the project directory.
    pub fn project_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    /// Slug of the project's `origin` remote, when there is one.
    pub async fn current_repo(&self, vcs: &SharedVcs) -> Option<String> {
        match vcs.origin_slug(&self.project_dir).await {
            Ok(slug) => slug,
            Err(e) => {
                tracing::debug!(error = %e, "Could not determine current repository");
                None
            }
        }
    }

    /// Resolve workflow references against the project.
    pub async fn resolve(
        &self,
        host: SharedHost,
        refs: &[String],
        current_repo: Option<String>,
    ) -> Result<ResolvedWorkflows> {
        let resolver = WorkflowResolver::new(host, &self.project_dir)
            .with_current_repo(current_repo)
            .with_shared_prefix(self.config.paths().shared_prefix);
        let resolved = resolver
            .resolve(refs)
            .await
            .context("Failed to resolve workflows")?;

        if self.verbose {
            let dim = Style::new().dim();
            for wf in &resolved.workflows {
                eprintln!(
                    "{}",
                    dim.apply_to(format!(
                        "Resolved {} ({} includes){}",
                        wf.spec,
                        wf.includes.len(),
                        if wf.fetched.commit_sha.is_empty() {
                            String::new()
                        } else {
                            format!(" at {}", wf.fetched.commit_sha)
                        }
                    ))
                );
            }
        }
        Ok(resolved)
    }
}

/// Asks on the terminal, defaulting to "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        let term = Term::stderr();
        if term.write_str(&format!("{} [y/N] ", prompt)).is_err() {
            return false;
        }
        match term.read_line() {
            Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}
