//! Version-control trait.
//!
//! Every operation takes the working-copy directory explicitly; nothing
//! depends on the process working directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// Local version-control operations used by installation and trials.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone a hosted repository into `dest` (which must not exist yet).
    async fn clone_repo(&self, slug: &str, dest: &Path) -> Result<()>;

    /// `owner/name` of the `origin` remote, if it points at the hosting platform.
    async fn origin_slug(&self, repo_dir: &Path) -> Result<Option<String>>;

    /// Stage paths (relative to `repo_dir`). An empty list stages everything.
    async fn add_paths(&self, repo_dir: &Path, paths: &[PathBuf]) -> Result<()>;

    /// Commit staged changes. Returns `false` when there was nothing to commit.
    async fn commit(&self, repo_dir: &Path, message: &str) -> Result<bool>;

    /// Pull (rebasing local commits) once, then push.
    ///
    /// A push rejected after the pull is reported as
    /// [`crate::HostError::Conflict`]; there is no second attempt.
    async fn pull_and_push(&self, repo_dir: &Path) -> Result<()>;

    /// Replace `branch` of `target_slug` with the default branch tree of
    /// `source_slug` (a forced push), using `scratch` as a temporary clone
    /// location.
    async fn force_push_tree(
        &self,
        source_slug: &str,
        target_slug: &str,
        branch: &str,
        scratch: &Path,
    ) -> Result<()>;
}

/// A shared version-control handle.
pub type SharedVcs = Arc<dyn VersionControl>;
