//! [`HostingService`] backed by the `gh` command-line tool.
//!
//! Uses the system `gh` binary so that authentication, enterprise hosts and
//! secret encryption are handled the same way the operator's shell does.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::process::{CommandOutput, run_command};
use crate::service::HostingService;
use crate::types::{
    CreateRepoOptions, PullRequest, RepoEdit, RunConclusion, RunStatus, WorkflowEntry,
    WorkflowRun, split_slug,
};
use crate::{HostError, Result};

/// Fields requested from `gh run list` / `gh run view`.
const RUN_FIELDS: &str = "databaseId,status,conclusion,url,createdAt";

/// Hosting service implemented by invoking `gh`.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
    timeout: Duration,
}

impl GhCli {
    /// Create a client that runs `program` (usually `gh`).
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<CommandOutput> {
        run_command(&self.program, &args, None, None, self.timeout)
            .await?
            .check()
    }

    async fn run_with_stdin(&self, args: Vec<String>, stdin: &[u8]) -> Result<CommandOutput> {
        run_command(&self.program, &args, None, Some(stdin), self.timeout)
            .await?
            .check()
    }

    async fn run_json<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        args: Vec<String>,
    ) -> Result<T> {
        let output = self.run(args).await?;
        serde_json::from_slice(&output.stdout).map_err(|e| HostError::Parse {
            what: what.to_string(),
            message: e.to_string(),
        })
    }
}

fn args<const N: usize>(list: [&str; N]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON shapes returned by gh
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhRun {
    database_id: u64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    conclusion: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<GhRun> for WorkflowRun {
    fn from(run: GhRun) -> Self {
        WorkflowRun {
            id: run.database_id,
            status: RunStatus::parse(&run.status),
            conclusion: RunConclusion::parse(&run.conclusion),
            url: run.url,
            created_at: run.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhSecret {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhWorkflowList {
    #[serde(default)]
    workflows: Vec<WorkflowEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    head_ref_name: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HostingService
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl HostingService for GhCli {
    async fn current_user(&self) -> Result<String> {
        let output = self.run(args(["api", "user", "--jq", ".login"])).await?;
        let login = output.stdout_text();
        if login.is_empty() {
            return Err(HostError::Unauthorized(
                "gh did not report an authenticated user".to_string(),
            ));
        }
        Ok(login)
    }

    async fn repo_exists(&self, slug: &str) -> Result<bool> {
        split_slug(slug)?;
        match self.run(args(["repo", "view", slug, "--json", "name"])).await {
            Ok(_) => Ok(true),
            Err(HostError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_repo(&self, slug: &str, options: &CreateRepoOptions) -> Result<()> {
        split_slug(slug)?;
        let mut cmd = args(["repo", "create", slug]);
        cmd.push(if options.private { "--private" } else { "--public" }.to_string());
        if !options.description.is_empty() {
            cmd.push("--description".to_string());
            cmd.push(options.description.clone());
        }
        if options.seed_readme {
            cmd.push("--add-readme".to_string());
        }
        self.run(cmd).await?;
        tracing::info!(repo = slug, "Created repository");
        Ok(())
    }

    async fn delete_repo(&self, slug: &str) -> Result<()> {
        split_slug(slug)?;
        self.run(args(["repo", "delete", slug, "--yes"])).await?;
        tracing::info!(repo = slug, "Deleted repository");
        Ok(())
    }

    async fn edit_repo(&self, slug: &str, edit: &RepoEdit) -> Result<()> {
        let mut cmd = args(["repo", "edit", slug]);
        if let Some(enable) = edit.enable_discussions {
            cmd.push(format!("--enable-discussions={}", enable));
        }
        if cmd.len() == 3 {
            return Ok(());
        }
        self.run(cmd).await?;
        Ok(())
    }

    async fn default_branch(&self, slug: &str) -> Result<String> {
        let path = format!("repos/{}", slug);
        let output = self
            .run(args(["api", &path, "--jq", ".default_branch"]))
            .await?;
        Ok(output.stdout_text())
    }

    async fn resolve_ref(&self, slug: &str, git_ref: &str) -> Result<String> {
        let path = format!("repos/{}/commits/{}", slug, git_ref);
        let output = self.run(args(["api", &path, "--jq", ".sha"])).await?;
        let sha = output.stdout_text();
        if sha.is_empty() {
            return Err(HostError::NotFound(format!("{}@{}", slug, git_ref)));
        }
        Ok(sha)
    }

    async fn fetch_file(&self, slug: &str, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        let endpoint = format!("repos/{}/contents/{}?ref={}", slug, path, git_ref);
        let output = self
            .run(args([
                "api",
                &endpoint,
                "-H",
                "Accept: application/vnd.github.raw",
            ]))
            .await?;
        Ok(output.stdout)
    }

    async fn list_secrets(&self, slug: &str) -> Result<Vec<String>> {
        let secrets: Vec<GhSecret> = self
            .run_json(
                "secret list",
                args(["secret", "list", "--repo", slug, "--json", "name"]),
            )
            .await?;
        Ok(secrets.into_iter().map(|s| s.name).collect())
    }

    async fn set_secret(&self, slug: &str, name: &str, value: &str) -> Result<()> {
        // gh reads the secret body from stdin when --body is omitted
        self.run_with_stdin(args(["secret", "set", name, "--repo", slug]), value.as_bytes())
            .await?;
        tracing::info!(repo = slug, secret = name, "Set repository secret");
        Ok(())
    }

    async fn list_workflows(&self, slug: &str) -> Result<Vec<WorkflowEntry>> {
        let path = format!("repos/{}/actions/workflows", slug);
        let list: GhWorkflowList = self
            .run_json("workflow list", args(["api", &path]))
            .await?;
        Ok(list.workflows)
    }

    async fn disable_workflow(&self, slug: &str, workflow: &str) -> Result<()> {
        self.run(args(["workflow", "disable", workflow, "--repo", slug]))
            .await?;
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        slug: &str,
        workflow_file: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut cmd = args(["workflow", "run", workflow_file, "--repo", slug, "--ref", git_ref]);
        for (key, value) in inputs {
            cmd.push("-f".to_string());
            cmd.push(format!("{}={}", key, value));
        }
        self.run(cmd).await?;
        Ok(())
    }

    async fn latest_run(&self, slug: &str, workflow_file: &str) -> Result<Option<WorkflowRun>> {
        let runs: Vec<GhRun> = self
            .run_json(
                "run list",
                args([
                    "run",
                    "list",
                    "--repo",
                    slug,
                    "--workflow",
                    workflow_file,
                    "--event",
                    "workflow_dispatch",
                    "--limit",
                    "1",
                    "--json",
                    RUN_FIELDS,
                ]),
            )
            .await?;
        Ok(runs.into_iter().next().map(WorkflowRun::from))
    }

    async fn run_status(&self, slug: &str, run_id: u64) -> Result<WorkflowRun> {
        let id = run_id.to_string();
        let run: GhRun = self
            .run_json(
                "run view",
                args(["run", "view", &id, "--repo", slug, "--json", RUN_FIELDS]),
            )
            .await?;
        Ok(run.into())
    }

    async fn download_artifacts(&self, slug: &str, run_id: u64, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest).await?;
        let id = run_id.to_string();
        let dir = dest.display().to_string();
        match self
            .run(args(["run", "download", &id, "--repo", slug, "--dir", &dir]))
            .await
        {
            Ok(_) => Ok(()),
            Err(HostError::Unknown(detail)) if detail.contains("no valid artifacts") => {
                Err(HostError::NoArtifacts(run_id))
            }
            Err(HostError::NotFound(detail)) if detail.contains("artifact") => {
                Err(HostError::NoArtifacts(run_id))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_pull_requests(&self, slug: &str) -> Result<Vec<PullRequest>> {
        let prs: Vec<GhPullRequest> = self
            .run_json(
                "pr list",
                args([
                    "pr",
                    "list",
                    "--repo",
                    slug,
                    "--state",
                    "open",
                    "--json",
                    "number,title,headRefName,createdAt",
                ]),
            )
            .await?;
        Ok(prs
            .into_iter()
            .map(|pr| PullRequest {
                number: pr.number,
                title: pr.title,
                head_ref: pr.head_ref_name,
                created_at: pr.created_at,
            })
            .collect())
    }

    async fn merge_pull_request(&self, slug: &str, number: u64) -> Result<()> {
        let id = number.to_string();
        self.run(args([
            "pr",
            "merge",
            &id,
            "--repo",
            slug,
            "--squash",
            "--delete-branch",
        ]))
        .await?;
        tracing::info!(repo = slug, pr = number, "Merged pull request");
        Ok(())
    }
}
