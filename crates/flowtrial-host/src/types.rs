//! Value types exchanged with the hosting service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{HostError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Repository slugs
// ─────────────────────────────────────────────────────────────────────────────

/// Split an `owner/name` slug into its two parts.
pub fn split_slug(slug: &str) -> Result<(&str, &str)> {
    let mut parts = slug.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Ok((owner, name))
        }
        _ => Err(HostError::Parse {
            what: "repository slug".to_string(),
            message: format!("'{}' is not of the form owner/name", slug),
        }),
    }
}

/// Check that a slug has two segments made of characters the hosting
/// platform accepts in owner and repository names.
pub fn validate_slug(slug: &str) -> Result<()> {
    let (owner, name) = split_slug(slug)?;
    let valid = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    };
    if !valid(owner) || !valid(name) {
        return Err(HostError::Parse {
            what: "repository slug".to_string(),
            message: format!("'{}' contains characters not allowed in a repository", slug),
        });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository management
// ─────────────────────────────────────────────────────────────────────────────

/// Options for creating a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRepoOptions {
    /// Create as private.
    pub private: bool,
    /// Repository description.
    pub description: String,
    /// Seed the repository with an initial README commit.
    pub seed_readme: bool,
}

impl Default for CreateRepoOptions {
    fn default() -> Self {
        Self {
            private: true,
            description: String::new(),
            seed_readme: true,
        }
    }
}

/// Repository settings changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoEdit {
    /// Enable or disable the discussions feature.
    pub enable_discussions: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows and runs
// ─────────────────────────────────────────────────────────────────────────────

/// A workflow registered in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    /// Platform identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Path within the repository (e.g. `.github/workflows/ci.yml`).
    pub path: String,
    /// `active`, `disabled_manually`, ...
    pub state: String,
}

impl WorkflowEntry {
    /// File name of the workflow definition.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Whether the workflow is currently enabled.
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Waiting,
    Pending,
    Requested,
    Completed,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Parse the platform's status string.
    pub fn parse(value: &str) -> Self {
        match value {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "waiting" => RunStatus::Waiting,
            "pending" => RunStatus::Pending,
            "requested" => RunStatus::Requested,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Unknown,
        }
    }
}

/// Final outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    TimedOut,
    Skipped,
    Neutral,
    ActionRequired,
    StartupFailure,
    Other(String),
}

impl RunConclusion {
    /// Parse the platform's conclusion string; empty means "not concluded".
    pub fn parse(value: &str) -> Option<Self> {
        let conclusion = match value {
            "" => return None,
            "success" => RunConclusion::Success,
            "failure" => RunConclusion::Failure,
            "cancelled" => RunConclusion::Cancelled,
            "timed_out" => RunConclusion::TimedOut,
            "skipped" => RunConclusion::Skipped,
            "neutral" => RunConclusion::Neutral,
            "action_required" => RunConclusion::ActionRequired,
            "startup_failure" => RunConclusion::StartupFailure,
            other => RunConclusion::Other(other.to_string()),
        };
        Some(conclusion)
    }

    /// Whether the run succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RunConclusion::Success)
    }
}

impl std::fmt::Display for RunConclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunConclusion::Success => "success",
            RunConclusion::Failure => "failure",
            RunConclusion::Cancelled => "cancelled",
            RunConclusion::TimedOut => "timed_out",
            RunConclusion::Skipped => "skipped",
            RunConclusion::Neutral => "neutral",
            RunConclusion::ActionRequired => "action_required",
            RunConclusion::StartupFailure => "startup_failure",
            RunConclusion::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// A workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    /// Platform run identifier.
    pub id: u64,
    /// Current status.
    pub status: RunStatus,
    /// Outcome, once completed.
    pub conclusion: Option<RunConclusion>,
    /// Web URL for the run.
    pub url: String,
    /// Creation time, if reported.
    pub created_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// An open pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Source branch.
    pub head_ref: String,
    /// Creation time, if reported.
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_slug() {
        assert_eq!(split_slug("octo/repo").unwrap(), ("octo", "repo"));
        assert!(split_slug("octo").is_err());
        assert!(split_slug("octo/repo/extra").is_err());
        assert!(split_slug("/repo").is_err());
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("octo-org/my_repo.rs").is_ok());
        assert!(validate_slug("octo/re po").is_err());
    }

    #[test]
    fn test_run_status_parse() {
        assert_eq!(RunStatus::parse("in_progress"), RunStatus::InProgress);
        assert_eq!(RunStatus::parse("completed"), RunStatus::Completed);
        assert_eq!(RunStatus::parse("mystery"), RunStatus::Unknown);
    }

    #[test]
    fn test_run_conclusion_parse() {
        assert_eq!(RunConclusion::parse(""), None);
        assert_eq!(RunConclusion::parse("success"), Some(RunConclusion::Success));
        assert_eq!(
            RunConclusion::parse("stale"),
            Some(RunConclusion::Other("stale".to_string()))
        );
        assert_eq!(RunConclusion::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn test_workflow_entry_file_name() {
        let entry = WorkflowEntry {
            id: 7,
            name: "CI".to_string(),
            path: ".github/workflows/ci.yml".to_string(),
            state: "active".to_string(),
        };
        assert_eq!(entry.file_name(), "ci.yml");
        assert!(entry.is_active());
    }
}
