//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [trial]      # sandbox naming, timeouts, results directory
//! [compiler]   # external markdown-to-workflow compiler command
//! [scanner]    # external security scanner command
//! [host]       # hosting CLI / version-control binaries
//! [paths]      # repository layout conventions
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowtrialConfig {
    /// Trial defaults.
    pub trial: Option<TrialSection>,
    /// Workflow compiler command.
    pub compiler: Option<CompilerSection>,
    /// Security scanner command.
    pub scanner: Option<ScannerSection>,
    /// Hosting and version-control binaries.
    pub host: Option<HostSection>,
    /// Repository layout conventions.
    pub paths: Option<PathsSection>,
}

impl FlowtrialConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale, matching how a project file is
    /// expected to restate the section it overrides.
    pub fn merge(&mut self, other: FlowtrialConfig) {
        if other.trial.is_some() {
            self.trial = other.trial;
        }
        if other.compiler.is_some() {
            self.compiler = other.compiler;
        }
        if other.scanner.is_some() {
            self.scanner = other.scanner;
        }
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.paths.is_some() {
            self.paths = other.paths;
        }
    }

    /// Effective trial section.
    pub fn trial(&self) -> TrialSection {
        self.trial.clone().unwrap_or_default()
    }

    /// Effective compiler section.
    pub fn compiler(&self) -> CompilerSection {
        self.compiler.clone().unwrap_or_default()
    }

    /// Effective scanner section.
    pub fn scanner(&self) -> ScannerSection {
        self.scanner.clone().unwrap_or_default()
    }

    /// Effective host section.
    pub fn host(&self) -> HostSection {
        self.host.clone().unwrap_or_default()
    }

    /// Effective paths section.
    pub fn paths(&self) -> PathsSection {
        self.paths.clone().unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if let Some(ref trial) = self.trial {
            if trial.poll_interval_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "trial.poll_interval_secs".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            if trial.host_repo_name.contains('/') {
                return Err(ConfigError::Invalid {
                    field: "trial.host_repo_name".to_string(),
                    message: "must be a bare repository name without an owner".to_string(),
                });
            }
        }
        if let Some(ref compiler) = self.compiler
            && compiler.command.is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "compiler.command".to_string(),
                message: "must name at least the program to run".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[trial]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSection {
    /// Repository name used for the sandbox when no host repo is given.
    /// The owner is the authenticated user.
    pub host_repo_name: String,
    /// How long to wait for a triggered run before giving up.
    pub timeout_minutes: u64,
    /// Interval between run-status queries.
    pub poll_interval_secs: u64,
    /// Local directory receiving result JSON files.
    pub results_dir: PathBuf,
    /// Merge pull requests created by a successful run.
    pub auto_merge_prs: bool,
    /// Delete the sandbox once all cycles are done.
    pub delete_host_repo_after: bool,
}

impl Default for TrialSection {
    fn default() -> Self {
        Self {
            host_repo_name: "flowtrial-sandbox".to_string(),
            timeout_minutes: 30,
            poll_interval_secs: 10,
            results_dir: PathBuf::from("trials"),
            auto_merge_prs: false,
            delete_host_repo_after: false,
        }
    }
}

impl TrialSection {
    /// Run timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// `[compiler]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSection {
    /// Program and leading arguments; workflow files are appended.
    pub command: Vec<String>,
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            command: vec!["gh".to_string(), "aw".to_string(), "compile".to_string()],
        }
    }
}

/// `[scanner]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSection {
    /// Program and arguments. Content is written to stdin; every non-empty
    /// stdout line is a finding. Empty means no scanner is configured.
    pub command: Vec<String>,
    /// Set to false to skip scanning entirely.
    pub enabled: bool,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            enabled: true,
        }
    }
}

/// `[host]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Hosting platform CLI binary.
    pub gh: String,
    /// Version-control binary.
    pub git: String,
    /// Web base URL used for clone URLs and links.
    pub web_url: String,
    /// Upper bound for any single CLI invocation.
    pub command_timeout_secs: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            gh: "gh".to_string(),
            git: "git".to_string(),
            web_url: "https://github.com".to_string(),
            command_timeout_secs: 300,
        }
    }
}

impl HostSection {
    /// Command timeout as a duration.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Directory, relative to a repository root, holding workflow documents.
    pub workflows_dir: PathBuf,
    /// Include paths starting with this prefix resolve against the
    /// repository root instead of the including file's directory.
    pub shared_prefix: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from(".github/workflows"),
            shared_prefix: "shared/".to_string(),
        }
    }
}
