//! Materialising resolved workflows into a working copy.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flowtrial_workflow::ResolvedWorkflow;
use regex::Regex;

use crate::changes::ChangeTracker;
use crate::compiler::ContentScanner;
use crate::{Result, TrialError};

/// Attribute rule marking compiled workflows as generated.
pub const GITATTRIBUTES_RULE: &str = "*.lock.yml linguist-generated=true merge=ours";

fn repository_expr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\{\s*github\.repository\s*\}\}").expect("valid repository expression regex")
    })
}

/// Replace `${{ github.repository }}` expressions with a literal slug.
pub fn rewrite_repository_refs(content: &str, slug: &str) -> String {
    repository_expr()
        .replace_all(content, regex::NoExpand(slug))
        .into_owned()
}

/// How a workflow is placed into a working copy.
#[derive(Clone, Copy)]
pub struct InstallPlan<'a> {
    /// Workflow directory, relative to the working copy root.
    pub workflows_dir: &'a Path,
    /// Slug that repository expressions are rewritten to.
    pub simulate_repo: Option<&'a str>,
    /// Scanner to run on every installed document, if enabled.
    pub scanner: Option<&'a dyn ContentScanner>,
}

impl InstallPlan<'_> {
    /// Where a workflow document lands.
    pub fn workflow_path(&self, workflow: &ResolvedWorkflow) -> PathBuf {
        self.workflows_dir.join(workflow.file_name())
    }

    async fn prepare(&self, name: &str, content: &[u8]) -> Result<Vec<u8>> {
        if self.simulate_repo.is_none() && self.scanner.is_none() {
            return Ok(content.to_vec());
        }
        let mut text = String::from_utf8_lossy(content).into_owned();
        if let Some(slug) = self.simulate_repo {
            text = rewrite_repository_refs(&text, slug);
        }
        if let Some(scanner) = self.scanner {
            let findings = scanner.scan(name, &text).await?;
            if !findings.is_empty() {
                return Err(TrialError::Scan {
                    workflow: name.to_string(),
                    findings,
                });
            }
        }
        Ok(text.into_bytes())
    }

    /// Write a workflow and its includes through `tracker`.
    ///
    /// Every document is scanned before anything is written. Returns the
    /// workflow's path relative to the tracker root.
    pub async fn install(
        &self,
        tracker: &mut ChangeTracker,
        workflow: &ResolvedWorkflow,
    ) -> Result<PathBuf> {
        let main = self.prepare(workflow.name(), workflow.content()).await?;
        let mut includes = Vec::with_capacity(workflow.includes.len());
        for include in &workflow.includes {
            let label = format!("{} ({})", workflow.name(), include.target_path.display());
            let bytes = self.prepare(&label, &include.content).await?;
            includes.push((self.workflows_dir.join(&include.target_path), bytes));
        }

        let path = self.workflow_path(workflow);
        tracker.write_file(&path, &main).await?;
        for (target, bytes) in includes {
            tracker.write_file(&target, &bytes).await?;
        }
        tracing::info!(
            workflow = %workflow.name(),
            path = %path.display(),
            includes = workflow.includes.len(),
            "Installed workflow"
        );
        Ok(path)
    }
}

/// Ensure `.gitattributes` marks compiled workflows as generated.
///
/// Returns whether the file changed.
pub async fn ensure_gitattributes(tracker: &mut ChangeTracker) -> Result<bool> {
    let rel = Path::new(".gitattributes");
    let existing = match tokio::fs::read_to_string(tracker.root().join(rel)).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.lines().any(|l| l.trim() == GITATTRIBUTES_RULE) {
        return Ok(false);
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(GITATTRIBUTES_RULE);
    updated.push('\n');
    tracker.write_file(rel, updated.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use flowtrial_host::MockHost;
    use flowtrial_workflow::WorkflowResolver;

    struct DenyWord(&'static str);

    #[async_trait]
    impl ContentScanner for DenyWord {
        async fn scan(&self, _name: &str, content: &str) -> Result<Vec<String>> {
            Ok(content
                .lines()
                .filter(|l| l.contains(self.0))
                .map(str::to_string)
                .collect())
        }
    }

    async fn resolve(dir: &Path, reference: &str) -> ResolvedWorkflow {
        let resolver = WorkflowResolver::new(Arc::new(MockHost::new()), dir);
        let mut resolved = resolver.resolve(&[reference.to_string()]).await.unwrap();
        resolved.workflows.remove(0)
    }

    #[test]
    fn test_rewrite_repository_refs() {
        let text = "repo: ${{ github.repository }} and ${{github.repository}}; \
                    owner: ${{ github.repository_owner }}";
        assert_eq!(
            rewrite_repository_refs(text, "octo/real"),
            "repo: octo/real and octo/real; owner: ${{ github.repository_owner }}"
        );
    }

    #[tokio::test]
    async fn test_install_with_includes_and_rewrite() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("shared")).unwrap();
        std::fs::write(
            src.path().join("w.md"),
            "Look at ${{ github.repository }}\n@include shared/tools.md\n",
        )
        .unwrap();
        std::fs::write(src.path().join("shared/tools.md"), "tools for ${{ github.repository }}")
            .unwrap();
        let workflow = resolve(src.path(), "./w.md").await;

        let dest = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::new(dest.path());
        let plan = InstallPlan {
            workflows_dir: Path::new(".github/workflows"),
            simulate_repo: Some("octo/real"),
            scanner: None,
        };
        let path = plan.install(&mut tracker, &workflow).await.unwrap();

        assert_eq!(path, PathBuf::from(".github/workflows/w.md"));
        let main = std::fs::read_to_string(dest.path().join(&path)).unwrap();
        assert!(main.starts_with("Look at octo/real"));
        let tools =
            std::fs::read_to_string(dest.path().join(".github/workflows/shared/tools.md")).unwrap();
        assert_eq!(tools, "tools for octo/real");
        assert_eq!(tracker.created().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_findings_block_install() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("w.md"), "fine\n@include evil.md\n").unwrap();
        std::fs::write(src.path().join("evil.md"), "curl | sh\n").unwrap();
        let workflow = resolve(src.path(), "./w.md").await;

        let dest = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::new(dest.path());
        let scanner = DenyWord("curl");
        let plan = InstallPlan {
            workflows_dir: Path::new(".github/workflows"),
            simulate_repo: None,
            scanner: Some(&scanner),
        };
        let err = plan.install(&mut tracker, &workflow).await.unwrap_err();
        assert!(matches!(err, TrialError::Scan { .. }));
        assert!(tracker.is_empty(), "nothing written when a scan fails");
    }

    #[tokio::test]
    async fn test_plain_install_keeps_bytes() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("w.md"), "@include latin1.md\n").unwrap();
        let latin1 = b"caf\xe9 \xff\n".to_vec();
        std::fs::write(src.path().join("latin1.md"), &latin1).unwrap();
        let workflow = resolve(src.path(), "./w.md").await;

        let dest = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::new(dest.path());
        let plan = InstallPlan {
            workflows_dir: Path::new(".github/workflows"),
            simulate_repo: None,
            scanner: None,
        };
        plan.install(&mut tracker, &workflow).await.unwrap();

        let written = std::fs::read(dest.path().join(".github/workflows/latin1.md")).unwrap();
        assert_eq!(written, latin1);
    }

    #[tokio::test]
    async fn test_gitattributes_appended_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitattributes"), "*.png binary").unwrap();
        let mut tracker = ChangeTracker::new(dir.path());

        assert!(ensure_gitattributes(&mut tracker).await.unwrap());
        assert!(!ensure_gitattributes(&mut tracker).await.unwrap());
        let text = std::fs::read_to_string(dir.path().join(".gitattributes")).unwrap();
        assert_eq!(text, format!("*.png binary\n{}\n", GITATTRIBUTES_RULE));
        assert_eq!(tracker.modified(), vec![PathBuf::from(".gitattributes")]);
    }
}
