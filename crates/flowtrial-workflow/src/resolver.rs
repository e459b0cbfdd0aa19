//! Batch resolution of workflow references.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use flowtrial_host::SharedHost;

use crate::fetch::{FetchedWorkflow, SourceFetcher};
use crate::frontmatter::parse_metadata;
use crate::includes::{DependencyCollector, IncludeDependency};
use crate::spec::WorkflowSpec;
use crate::{DEFAULT_SHARED_PREFIX, Result, WorkflowError};

/// A workflow ready for installation.
#[derive(Debug, Clone)]
pub struct ResolvedWorkflow {
    /// The reference this workflow was resolved from.
    pub spec: WorkflowSpec,
    /// Content and provenance.
    pub fetched: FetchedWorkflow,
    /// Files the workflow includes, transitively.
    pub includes: Vec<IncludeDependency>,
    /// Header `description`, empty when absent.
    pub description: String,
    /// Preferred execution engine.
    pub engine: Option<String>,
    /// Whether the workflow can be triggered manually.
    pub has_workflow_dispatch: bool,
}

impl ResolvedWorkflow {
    /// Derived workflow name (file stem).
    pub fn name(&self) -> &str {
        &self.spec.workflow_name
    }

    /// Raw workflow content.
    pub fn content(&self) -> &[u8] {
        &self.fetched.content
    }

    /// File name the workflow is installed under.
    pub fn file_name(&self) -> String {
        format!("{}.md", self.spec.workflow_name)
    }

    /// File name of the compiled workflow.
    pub fn lock_file_name(&self) -> String {
        format!("{}.lock.yml", self.spec.workflow_name)
    }
}

/// The output of one resolution: every workflow plus batch-level flags.
#[derive(Debug, Clone, Default)]
pub struct ResolvedWorkflows {
    pub workflows: Vec<ResolvedWorkflow>,
    /// Whether any input reference was a wildcard.
    pub has_wildcard: bool,
    /// Whether any resolved workflow declares `workflow_dispatch`.
    pub has_workflow_dispatch: bool,
}

impl ResolvedWorkflows {
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Workflow names in resolution order.
    pub fn names(&self) -> Vec<String> {
        self.workflows.iter().map(|w| w.name().to_string()).collect()
    }
}

/// Resolves reference strings into [`ResolvedWorkflows`].
#[derive(Clone)]
pub struct WorkflowResolver {
    fetcher: SourceFetcher,
    collector: DependencyCollector,
    current_repo: Option<String>,
}

impl WorkflowResolver {
    /// Create a resolver. Local references are read relative to `base_dir`.
    pub fn new(host: SharedHost, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher: SourceFetcher::new(host.clone(), base_dir),
            collector: DependencyCollector::new(host, DEFAULT_SHARED_PREFIX),
            current_repo: None,
        }
    }

    /// Repository being installed into; remote references to it are refused.
    pub fn with_current_repo(mut self, slug: Option<String>) -> Self {
        self.current_repo = slug;
        self
    }

    /// Prefix of include paths resolved against the repository root.
    pub fn with_shared_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.collector = DependencyCollector::new(self.fetcher.host().clone(), prefix);
        self
    }

    /// Directory local references are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.fetcher.base_dir()
    }

    /// Resolve a batch of references.
    ///
    /// Every step must succeed for every reference; one bad reference fails
    /// the whole batch.
    pub async fn resolve(&self, refs: &[String]) -> Result<ResolvedWorkflows> {
        if refs.is_empty() {
            return Err(WorkflowError::NoWorkflows(
                "at least one workflow reference is required".to_string(),
            ));
        }
        if refs.iter().any(|r| r.trim().is_empty()) {
            return Err(WorkflowError::invalid("", "reference is empty"));
        }

        let specs = refs
            .iter()
            .map(|r| WorkflowSpec::parse(r))
            .collect::<Result<Vec<_>>>()?;

        for spec in &specs {
            if spec.is_wildcard && !spec.is_local() {
                return Err(WorkflowError::RemoteWildcard(spec.to_string()));
            }
        }

        if let Some(current) = &self.current_repo {
            for spec in specs.iter().filter(|s| !s.is_local()) {
                if spec.repo_slug.eq_ignore_ascii_case(current) {
                    return Err(WorkflowError::SelfReference(spec.repo_slug.clone()));
                }
            }
        }

        let has_wildcard = specs.iter().any(|s| s.is_wildcard);
        let expanded = self.expand_wildcards(specs)?;

        let mut seen = HashSet::new();
        let mut install_names: HashMap<String, String> = HashMap::new();
        let mut workflows = Vec::with_capacity(expanded.len());
        for spec in expanded {
            if !seen.insert(spec.dedup_key()) {
                tracing::debug!(workflow = %spec, "Skipping duplicate reference");
                continue;
            }
            let name = format!("{}.md", spec.workflow_name);
            if let Some(first) = install_names.get(&name) {
                return Err(WorkflowError::DuplicateName {
                    name,
                    first: first.clone(),
                    second: spec.to_string(),
                });
            }
            install_names.insert(name, spec.to_string());
            workflows.push(self.resolve_one(spec).await?);
        }

        let has_workflow_dispatch = workflows.iter().any(|w| w.has_workflow_dispatch);
        tracing::info!(
            count = workflows.len(),
            has_wildcard,
            has_workflow_dispatch,
            "Resolved workflows"
        );
        Ok(ResolvedWorkflows {
            workflows,
            has_wildcard,
            has_workflow_dispatch,
        })
    }

    fn expand_wildcards(&self, specs: Vec<WorkflowSpec>) -> Result<Vec<WorkflowSpec>> {
        let any_wildcard = specs.iter().any(|s| s.is_wildcard);
        let mut expanded = Vec::new();

        for spec in specs {
            if !spec.is_wildcard {
                expanded.push(spec);
                continue;
            }

            let pattern = self.fetcher.local_path(&spec.workflow_path);
            let pattern_str = pattern.to_string_lossy();
            let paths = glob::glob(&pattern_str).map_err(|e| {
                WorkflowError::invalid(&spec.workflow_path, format!("bad glob pattern: {}", e))
            })?;

            let mut matched = 0;
            for entry in paths {
                let path = match entry {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(error = %e, "Unreadable path while expanding wildcard");
                        continue;
                    }
                };
                if !path.is_file() || path.extension().is_none_or(|ext| ext != "md") {
                    continue;
                }
                let display = match path.strip_prefix(self.base_dir()) {
                    Ok(rel) => format!("./{}", rel.display()),
                    Err(_) => path.display().to_string(),
                };
                expanded.push(WorkflowSpec::local(display));
                matched += 1;
            }

            if matched == 0 {
                tracing::warn!(pattern = %spec.workflow_path, "Wildcard matched no markdown files");
            } else {
                tracing::debug!(pattern = %spec.workflow_path, matched, "Expanded wildcard");
            }
        }

        if any_wildcard && expanded.is_empty() {
            return Err(WorkflowError::NoWorkflows(
                "no workflows to add after wildcard expansion".to_string(),
            ));
        }
        Ok(expanded)
    }

    async fn resolve_one(&self, spec: WorkflowSpec) -> Result<ResolvedWorkflow> {
        let fetched = self.fetcher.fetch(&spec).await?;

        let includes = if fetched.is_local {
            let file = self.fetcher.local_path(&spec.workflow_path);
            self.collector.collect_local(&fetched.content, &file).await?
        } else {
            let git_ref = if fetched.commit_sha.is_empty() {
                &fetched.git_ref
            } else {
                &fetched.commit_sha
            };
            self.collector
                .collect_remote(&fetched.content, &spec.repo_slug, &fetched.source_path, git_ref)
                .await?
        };

        let text = fetched.text();
        let metadata = match parse_metadata(&spec.to_string(), &text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(workflow = %spec, error = %e, "Ignoring unreadable frontmatter");
                Default::default()
            }
        };

        tracing::debug!(
            workflow = %spec.workflow_name,
            source = %fetched.source_path,
            sha = %fetched.commit_sha,
            includes = includes.len(),
            "Resolved workflow"
        );

        Ok(ResolvedWorkflow {
            spec,
            fetched,
            includes,
            description: metadata.description,
            engine: metadata.engine,
            has_workflow_dispatch: metadata.has_workflow_dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use flowtrial_host::MockHost;

    fn resolver(host: MockHost, dir: &Path) -> WorkflowResolver {
        WorkflowResolver::new(Arc::new(host), dir)
    }

    fn refs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(MockHost::new(), dir.path());
        assert!(matches!(
            r.resolve(&[]).await,
            Err(WorkflowError::NoWorkflows(_))
        ));
        assert!(matches!(
            r.resolve(&refs(&["./a.md", " "])).await,
            Err(WorkflowError::InvalidSpec { .. })
        ));
    }

    #[tokio::test]
    async fn test_parse_failure_is_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(MockHost::new());
        let r = WorkflowResolver::new(host.clone(), dir.path());
        let err = r
            .resolve(&refs(&["owner/repo", "octo/agents/triage"]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidSpec { .. }));
        assert!(host.calls().is_empty(), "no fetch after a parse failure");
    }

    #[tokio::test]
    async fn test_remote_wildcard_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["octo/agents/workflows/*.md@main"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wildcards only supported for local"));
    }

    #[tokio::test]
    async fn test_self_reference_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(MockHost::new(), dir.path())
            .with_current_repo(Some("Octo/Agents".to_string()))
            .resolve(&refs(&["octo/agents/triage"]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SelfReference(_)));
    }

    #[tokio::test]
    async fn test_local_without_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "---\non: push\ndescription: A\n---\nbody a\n");
        write(dir.path(), "b.md", "# no frontmatter\n");

        let resolved = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./a.md", "./b.md"]))
            .await
            .unwrap();
        assert_eq!(resolved.names(), vec!["a", "b"]);
        assert!(!resolved.has_workflow_dispatch);
        assert!(!resolved.has_wildcard);
        assert_eq!(resolved.workflows[0].description, "A");
        assert_eq!(resolved.workflows[1].description, "");
        assert_eq!(resolved.workflows[1].engine, None);
    }

    #[tokio::test]
    async fn test_local_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let original = "---\non: workflow_dispatch\n---\nbody ünïcode\r\n";
        write(dir.path(), "w.md", original);

        let host = Arc::new(MockHost::new());
        let r = WorkflowResolver::new(host.clone(), dir.path());
        let resolved = r.resolve(&refs(&["./w.md"])).await.unwrap();
        let refetched = SourceFetcher::new(host.clone(), dir.path())
            .fetch(&resolved.workflows[0].spec)
            .await
            .unwrap();
        assert_eq!(refetched.content, resolved.workflows[0].content());
        assert_eq!(refetched.content, original.as_bytes());
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_fallback_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new()
            .with_file(
                "owner/repo",
                "workflows/workflow.md",
                "---\non:\n  workflow_dispatch:\nengine: claude\n---\nrun\n",
            )
            .with_ref("owner/repo", "v1", "0123abcd");

        let resolved = resolver(host, dir.path())
            .resolve(&refs(&["owner/repo/workflow@v1"]))
            .await
            .unwrap();
        let wf = &resolved.workflows[0];
        assert_eq!(wf.fetched.source_path, "workflows/workflow.md");
        assert_eq!(wf.fetched.commit_sha, "0123abcd");
        assert_eq!(wf.engine.as_deref(), Some("claude"));
        assert!(resolved.has_workflow_dispatch);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_batch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "a");
        let err = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./a.md", "./missing.md"]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wildcard_expansion() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "flows/one.md", "---\non: workflow_dispatch\n---\n");
        write(dir.path(), "flows/two.md", "two");
        write(dir.path(), "flows/notes.txt", "skip");

        let resolved = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./flows/*"]))
            .await
            .unwrap();
        assert_eq!(resolved.names(), vec!["one", "two"]);
        assert!(resolved.has_wildcard);
        assert!(resolved.has_workflow_dispatch);
        assert!(!resolved.workflows[0].spec.is_wildcard);
        assert_eq!(resolved.workflows[0].spec.workflow_path, "./flows/one.md");
    }

    #[tokio::test]
    async fn test_wildcard_zero_matches() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "a");

        // One empty pattern alongside a concrete reference only warns
        let resolved = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./none/*.md", "./a.md"]))
            .await
            .unwrap();
        assert_eq!(resolved.names(), vec!["a"]);

        // Nothing left at all is an error
        let err = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./none/*.md"]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NoWorkflows(_)));
    }

    #[tokio::test]
    async fn test_duplicates_collapse() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "a");
        let resolved = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./a.md", "./a.md"]))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn test_same_install_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/x.md", "first");
        write(dir.path(), "b/x.md", "second");

        let err = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./a/x.md", "./b/x.md"]))
            .await
            .unwrap_err();
        match err {
            WorkflowError::DuplicateName { name, first, second } => {
                assert_eq!(name, "x.md");
                assert!(first.contains("a/x.md"));
                assert!(second.contains("b/x.md"));
            }
            other => panic!("expected duplicate name, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_includes_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "w.md", "@include shared/s.md\n@include? opt.md\n");
        write(dir.path(), "shared/s.md", "s");

        let resolved = resolver(MockHost::new(), dir.path())
            .resolve(&refs(&["./w.md"]))
            .await
            .unwrap();
        let includes = &resolved.workflows[0].includes;
        assert_eq!(includes.len(), 1);
        assert_eq!(includes[0].target_path, PathBuf::from("shared/s.md"));
    }
}
