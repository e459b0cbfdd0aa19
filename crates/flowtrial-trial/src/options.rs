//! Trial options and execution mode selection.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use flowtrial_config::FlowtrialConfig;
use flowtrial_host::validate_slug;
use serde::Serialize;

use crate::{Result, TrialError};

/// Everything that controls one trial invocation, across all its cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialOptions {
    /// Sandbox repository. `None` means `<user>/<host_repo_name>`.
    pub host_repo: Option<String>,
    /// Repository whose content is force-pushed into the sandbox.
    pub clone_repo: Option<String>,
    /// Repository the run pretends to operate on.
    pub logical_repo: Option<String>,
    /// Delete and re-create an existing sandbox first.
    pub force_delete_host_repo_before: bool,
    /// Delete the sandbox after the last cycle.
    pub delete_host_repo_after: bool,
    /// Additional cycles after the first.
    pub repeat_count: u32,
    /// How long to wait for each run.
    pub timeout: Duration,
    /// Interval between run-status queries.
    pub poll_interval: Duration,
    /// Merge pull requests created by successful runs.
    pub auto_merge_prs: bool,
    /// Engine override for every workflow.
    pub engine: Option<String>,
    /// Issue or pull request reference passed to the run.
    pub trigger_context: Option<String>,
    /// Skip the security scanner.
    pub disable_security_scanner: bool,
    /// Plan only; change nothing.
    pub dry_run: bool,
    /// Local directory for result files.
    pub results_dir: PathBuf,
    /// Workflow directory inside the sandbox.
    pub workflows_dir: PathBuf,
    /// Sandbox name used when `host_repo` is not given.
    pub host_repo_name: String,
}

impl Default for TrialOptions {
    fn default() -> Self {
        Self::from_config(&FlowtrialConfig::default())
    }
}

impl TrialOptions {
    /// Options with defaults taken from configuration.
    pub fn from_config(config: &FlowtrialConfig) -> Self {
        let trial = config.trial();
        let paths = config.paths();
        Self {
            host_repo: None,
            clone_repo: None,
            logical_repo: None,
            force_delete_host_repo_before: false,
            delete_host_repo_after: trial.delete_host_repo_after,
            repeat_count: 0,
            timeout: trial.timeout(),
            poll_interval: trial.poll_interval(),
            auto_merge_prs: trial.auto_merge_prs,
            engine: None,
            trigger_context: None,
            disable_security_scanner: false,
            dry_run: false,
            results_dir: trial.results_dir,
            workflows_dir: paths.workflows_dir,
            host_repo_name: trial.host_repo_name,
        }
    }

    /// Total number of cycles (the first plus repeats).
    pub fn total_cycles(&self) -> u32 {
        self.repeat_count.saturating_add(1)
    }

    /// Check that every repository slug given is well-formed.
    pub fn validate(&self) -> Result<()> {
        for (flag, value) in [
            ("host repo", &self.host_repo),
            ("clone repo", &self.clone_repo),
            ("logical repo", &self.logical_repo),
        ] {
            if let Some(slug) = value {
                validate_slug(slug)
                    .map_err(|e| TrialError::Options(format!("{}: {}", flag, e)))?;
            }
        }
        if self.poll_interval.is_zero() {
            return Err(TrialError::Options(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a trial relates the sandbox to real repositories.
///
/// Exactly one mode applies per invocation, chosen by priority:
/// clone > logical > direct > default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrialMode {
    /// Seed the sandbox with `source`'s content and run there.
    Clone { source: String },
    /// Run in the sandbox while pretending to be `target`.
    Logical { target: String },
    /// Run in the given host repository as-is.
    Direct { host: String },
    /// Run in the default sandbox pretending to be the current repository.
    Default { current: String },
}

impl TrialMode {
    /// Pick the mode for a set of options.
    ///
    /// `current_repo` is the operator's working repository, required only
    /// when no other mode applies.
    pub fn select(options: &TrialOptions, current_repo: Option<&str>) -> Result<Self> {
        if let Some(source) = &options.clone_repo {
            return Ok(TrialMode::Clone {
                source: source.clone(),
            });
        }
        if let Some(target) = &options.logical_repo {
            return Ok(TrialMode::Logical {
                target: target.clone(),
            });
        }
        if let Some(host) = &options.host_repo {
            return Ok(TrialMode::Direct { host: host.clone() });
        }
        match current_repo {
            Some(current) => Ok(TrialMode::Default {
                current: current.to_string(),
            }),
            None => Err(TrialError::Options(
                "could not determine the current repository; \
                 pass --logical-repo, --clone-repo, or --host-repo"
                    .to_string(),
            )),
        }
    }

    /// Whether the sandbox content is overwritten from a source repository.
    pub fn seeds_content(&self) -> bool {
        matches!(self, TrialMode::Clone { .. })
    }

    /// Repository that `${{ github.repository }}` is rewritten to.
    pub fn simulated_repo(&self) -> Option<&str> {
        match self {
            TrialMode::Logical { target } => Some(target),
            TrialMode::Default { current } => Some(current),
            TrialMode::Clone { .. } | TrialMode::Direct { .. } => None,
        }
    }

    /// Repository named in result file names.
    pub fn result_label<'a>(&'a self, host_repo: &'a str) -> &'a str {
        match self {
            TrialMode::Clone { source } => source,
            TrialMode::Logical { target } => target,
            TrialMode::Direct { .. } => host_repo,
            TrialMode::Default { current } => current,
        }
    }
}

impl fmt::Display for TrialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialMode::Clone { source } => write!(f, "clone of {}", source),
            TrialMode::Logical { target } => write!(f, "simulating {}", target),
            TrialMode::Direct { host } => write!(f, "direct in {}", host),
            TrialMode::Default { current } => write!(f, "simulating current repository {}", current),
        }
    }
}
