//! Workflow source retrieval.

use std::path::{Path, PathBuf};

use flowtrial_host::{SharedHost, split_slug};

use crate::spec::WorkflowSpec;
use crate::{Result, WorkflowError};

/// Directories searched when a bare workflow name is not found at the
/// repository root.
pub const FALLBACK_DIRS: [&str; 2] = ["workflows", ".github/workflows"];

/// Raw content of a workflow plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedWorkflow {
    /// Raw bytes.
    pub content: Vec<u8>,
    /// Commit the ref resolved to; empty for local sources or when the
    /// ref could not be resolved.
    pub commit_sha: String,
    /// Whether the content was read from the local file system.
    pub is_local: bool,
    /// Path actually read, which may be a fallback location.
    pub source_path: String,
    /// Ref the remote content was read at; empty for local sources.
    pub git_ref: String,
}

impl FetchedWorkflow {
    /// Content as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Reads workflow sources from disk or through the hosting service.
///
/// Local paths are resolved against `base_dir`, never the process working
/// directory. Nothing is cached; every fetch reflects the current ref.
#[derive(Clone)]
pub struct SourceFetcher {
    host: SharedHost,
    base_dir: PathBuf,
}

impl SourceFetcher {
    /// Create a fetcher. `base_dir` anchors relative local paths.
    pub fn new(host: SharedHost, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            base_dir: base_dir.into(),
        }
    }

    /// The hosting service used for remote sources.
    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    /// Directory relative local paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute location of a local path.
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Retrieve the content a spec points at.
    pub async fn fetch(&self, spec: &WorkflowSpec) -> Result<FetchedWorkflow> {
        if spec.is_local() {
            self.fetch_local(spec).await
        } else {
            self.fetch_remote(spec).await
        }
    }

    async fn fetch_local(&self, spec: &WorkflowSpec) -> Result<FetchedWorkflow> {
        let path = self.local_path(&spec.workflow_path);
        let content = read_local_file(&path).await?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "Read local workflow");
        Ok(FetchedWorkflow {
            content,
            commit_sha: String::new(),
            is_local: true,
            source_path: spec.workflow_path.clone(),
            git_ref: String::new(),
        })
    }

    async fn fetch_remote(&self, spec: &WorkflowSpec) -> Result<FetchedWorkflow> {
        let slug = spec.repo_slug.as_str();
        split_slug(slug)?;

        let git_ref = if spec.version.is_empty() {
            self.host.default_branch(slug).await?
        } else {
            spec.version.clone()
        };

        let commit_sha = match self.host.resolve_ref(slug, &git_ref).await {
            Ok(sha) => sha,
            Err(e) => {
                tracing::warn!(repo = slug, git_ref = %git_ref, error = %e, "Could not resolve ref to a commit");
                String::new()
            }
        };

        // Prefer the immutable commit so the content matches the recorded provenance
        let read_ref = if commit_sha.is_empty() {
            git_ref.as_str()
        } else {
            commit_sha.as_str()
        };

        let mut tried = vec![spec.workflow_path.clone()];
        let mut result = self.host.fetch_file(slug, &spec.workflow_path, read_ref).await;

        let bare_name = !spec.workflow_path.contains('/');
        if bare_name && matches!(&result, Err(e) if e.is_not_found()) {
            for dir in FALLBACK_DIRS {
                let candidate = format!("{}/{}.md", dir, spec.workflow_name);
                tracing::debug!(repo = slug, path = %candidate, "Trying fallback location");
                result = self.host.fetch_file(slug, &candidate, read_ref).await;
                tried.push(candidate);
                match &result {
                    Err(e) if e.is_not_found() => continue,
                    _ => break,
                }
            }
        }

        match result {
            Ok(content) => {
                let source_path = tried.pop().unwrap_or_default();
                tracing::debug!(
                    repo = slug,
                    path = %source_path,
                    sha = %commit_sha,
                    "Fetched remote workflow"
                );
                Ok(FetchedWorkflow {
                    content,
                    commit_sha,
                    is_local: false,
                    source_path,
                    git_ref,
                })
            }
            Err(e) if e.is_not_found() => Err(WorkflowError::NotFound(format!(
                "{}@{} (tried {})",
                slug,
                git_ref,
                tried.join(", ")
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a local file, rejecting directories.
pub(crate) async fn read_local_file(path: &Path) -> Result<Vec<u8>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkflowError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(WorkflowError::io(path, e)),
    };
    if metadata.is_dir() {
        return Err(WorkflowError::NotFound(format!(
            "{} is a directory, not a workflow file",
            path.display()
        )));
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| WorkflowError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use flowtrial_host::MockHost;

    fn fetcher(host: MockHost, dir: &Path) -> SourceFetcher {
        SourceFetcher::new(Arc::new(host), dir)
    }

    #[tokio::test]
    async fn test_fetch_local() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "---\non: push\n---\nhello").unwrap();
        let f = fetcher(MockHost::new(), dir.path());

        let spec = WorkflowSpec::parse("./a.md").unwrap();
        let fetched = f.fetch(&spec).await.unwrap();
        assert!(fetched.is_local);
        assert!(fetched.commit_sha.is_empty());
        assert_eq!(fetched.source_path, "./a.md");
        assert_eq!(fetched.text(), "---\non: push\n---\nhello");

        // A second read is byte-identical
        let again = f.fetch(&spec).await.unwrap();
        assert_eq!(again.content, fetched.content);
    }

    #[tokio::test]
    async fn test_fetch_local_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("dir.md")).unwrap();
        let f = fetcher(MockHost::new(), dir.path());

        let missing = f.fetch(&WorkflowSpec::parse("./nope.md").unwrap()).await;
        assert!(matches!(missing, Err(WorkflowError::NotFound(_))));

        let directory = f.fetch(&WorkflowSpec::parse("./dir.md").unwrap()).await;
        assert!(directory.unwrap_err().to_string().contains("directory"));
    }

    #[tokio::test]
    async fn test_fetch_remote_direct_path() {
        let host = MockHost::new()
            .with_file("octo/agents", "flows/triage.md", "triage")
            .with_ref("octo/agents", "v1", "abc123");
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(host, dir.path());

        let spec = WorkflowSpec::parse("octo/agents/flows/triage.md@v1").unwrap();
        let fetched = f.fetch(&spec).await.unwrap();
        assert!(!fetched.is_local);
        assert_eq!(fetched.commit_sha, "abc123");
        assert_eq!(fetched.source_path, "flows/triage.md");
        assert_eq!(fetched.content, b"triage");
    }

    #[tokio::test]
    async fn test_fetch_remote_fallback_location() {
        let host = MockHost::new()
            .with_file("owner/repo", "workflows/workflow.md", "found")
            .with_ref("owner/repo", "v1", "deadbeef");
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(host, dir.path());

        let spec = WorkflowSpec::parse("owner/repo/workflow@v1").unwrap();
        let fetched = f.fetch(&spec).await.unwrap();
        assert_eq!(fetched.source_path, "workflows/workflow.md");
        assert_eq!(fetched.content, b"found");
    }

    #[tokio::test]
    async fn test_fetch_remote_second_fallback() {
        let host = MockHost::new().with_file("owner/repo", ".github/workflows/ci.md", "ci");
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(host, dir.path());

        let fetched = f
            .fetch(&WorkflowSpec::parse("owner/repo/ci").unwrap())
            .await
            .unwrap();
        assert_eq!(fetched.source_path, ".github/workflows/ci.md");
        // Unresolvable ref degrades to an empty SHA
        assert!(fetched.commit_sha.is_empty());
        assert_eq!(fetched.git_ref, "main");
    }

    #[tokio::test]
    async fn test_fetch_remote_not_found_anywhere() {
        let host = MockHost::new().with_repo("owner/repo");
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(host, dir.path());

        let err = f
            .fetch(&WorkflowSpec::parse("owner/repo/missing").unwrap())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing.md"));
        assert!(msg.contains("workflows/missing.md"));
        assert!(msg.contains(".github/workflows/missing.md"));
    }

    #[tokio::test]
    async fn test_no_fallback_for_nested_path() {
        let host = MockHost::new().with_file("owner/repo", "workflows/x.md", "x");
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(host, dir.path());

        let err = f
            .fetch(&WorkflowSpec::parse("owner/repo/other/x.md").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
