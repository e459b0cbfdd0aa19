//! [`VersionControl`] backed by the system `git` binary.
//!
//! Uses the system `git` command for better credential handling
//! (SSH keys, credential helpers, `gh auth setup-git`, etc.).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::process::{CommandOutput, run_command};
use crate::vcs::VersionControl;
use crate::{HostError, Result};

/// Git operations for working copies.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    web_url: String,
    timeout: Duration,
}

impl GitCli {
    /// Create a git client. `web_url` is the hosting platform's base URL,
    /// e.g. `https://github.com`.
    pub fn new(program: impl Into<String>, web_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Clone URL for a repository slug.
    pub fn clone_url(&self, slug: &str) -> String {
        format!("{}/{}.git", self.web_url, slug)
    }

    async fn git(&self, repo_dir: Option<&Path>, args: &[&str]) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        run_command(&self.program, &args, repo_dir, None, self.timeout).await
    }

    async fn git_checked(&self, repo_dir: Option<&Path>, args: &[&str]) -> Result<CommandOutput> {
        self.git(repo_dir, args).await?.check()
    }
}

/// Extract `owner/name` from a remote URL.
///
/// Understands `https://host/owner/name(.git)` and `git@host:owner/name(.git)`.
pub fn parse_remote_slug(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')?.1
    } else if let Some(idx) = url.find("://") {
        let after_scheme = &url[idx + 3..];
        after_scheme.split_once('/')?.1
    } else {
        return None;
    };

    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Some(format!("{}/{}", owner, name))
        }
        _ => None,
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repo(&self, slug: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let url = self.clone_url(slug);
        let dest_str = dest.display().to_string();
        self.git_checked(None, &["clone", &url, &dest_str]).await?;
        tracing::debug!(repo = slug, dest = %dest.display(), "Cloned repository");
        Ok(())
    }

    async fn origin_slug(&self, repo_dir: &Path) -> Result<Option<String>> {
        let output = self
            .git(Some(repo_dir), &["remote", "get-url", "origin"])
            .await?;
        if !output.success {
            // Not a repository, or no origin remote
            return Ok(None);
        }
        Ok(parse_remote_slug(&output.stdout_text()))
    }

    async fn add_paths(&self, repo_dir: &Path, paths: &[PathBuf]) -> Result<()> {
        let mut args = vec!["add".to_string()];
        if paths.is_empty() {
            args.push("-A".to_string());
        } else {
            args.push("--".to_string());
            args.extend(paths.iter().map(|p| p.display().to_string()));
        }
        run_command(&self.program, &args, Some(repo_dir), None, self.timeout)
            .await?
            .check()?;
        Ok(())
    }

    async fn commit(&self, repo_dir: &Path, message: &str) -> Result<bool> {
        let status = self
            .git_checked(Some(repo_dir), &["diff", "--cached", "--name-only"])
            .await?;
        if status.stdout_text().is_empty() {
            tracing::debug!(dir = %repo_dir.display(), "Nothing staged, skipping commit");
            return Ok(false);
        }
        self.git_checked(Some(repo_dir), &["commit", "-m", message])
            .await?;
        Ok(true)
    }

    async fn pull_and_push(&self, repo_dir: &Path) -> Result<()> {
        let pull = self.git(Some(repo_dir), &["pull", "--rebase"]).await?;
        if !pull.success {
            // An aborted rebase leaves the tree mid-operation; undo it before failing
            let _ = self.git(Some(repo_dir), &["rebase", "--abort"]).await;
            return Err(HostError::classify(&pull.stderr));
        }

        let push = self.git(Some(repo_dir), &["push"]).await?;
        if push.success {
            return Ok(());
        }
        match HostError::classify(&push.stderr) {
            HostError::Unknown(detail) => Err(HostError::Conflict(detail)),
            other => Err(other),
        }
    }

    async fn force_push_tree(
        &self,
        source_slug: &str,
        target_slug: &str,
        branch: &str,
        scratch: &Path,
    ) -> Result<()> {
        let checkout = scratch.join("source");
        if checkout.exists() {
            tokio::fs::remove_dir_all(&checkout).await?;
        }
        self.clone_repo(source_slug, &checkout).await?;

        let target_url = self.clone_url(target_slug);
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.git_checked(Some(&checkout), &["push", "--force", &target_url, &refspec])
            .await?;
        tracing::info!(
            source = source_slug,
            target = target_slug,
            branch,
            "Force-pushed source tree into sandbox"
        );
        Ok(())
    }
}
