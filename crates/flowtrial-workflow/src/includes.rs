//! Include/import dependency collection.
//!
//! A workflow document can pull in other files with line directives:
//!
//! ```text
//! @include shared/tools.md
//! @include? local-overrides.md        # optional
//! @import helpers/format.md#Section   # fragment is ignored for resolution
//! {{#import? extra.md}}
//! ```
//!
//! or through an `imports:` list in its frontmatter. The collector walks
//! these edges breadth-first with a visited set keyed by source location,
//! so cyclic graphs terminate and every file is returned at most once.
//!
//! Remote includes are addressed three ways, checked in this order:
//!
//! 1. `owner/repo/path[@ref]`: fetched independently of the including file
//! 2. the shared prefix (`shared/` by default): resolved at the repository
//!    root and materialised at the path as written
//! 3. anything else: relative to the including file, on both the source and
//!    the target side

use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use flowtrial_host::SharedHost;
use regex::Regex;

use crate::fetch::read_local_file;
use crate::frontmatter::parse_metadata;
use crate::spec::WorkflowSpec;
use crate::{Result, WorkflowError};

/// One file a workflow depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDependency {
    /// Where the file was read from: a local path, or `owner/repo/path@ref`.
    pub source_path: String,
    /// Where to materialise it, relative to the directory the workflow is
    /// installed into.
    pub target_path: PathBuf,
    /// Whether a missing source is tolerated.
    pub is_optional: bool,
    /// File content.
    pub content: Vec<u8>,
}

/// An include directive found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    /// Referenced path with any `#section` fragment removed.
    pub path: String,
    /// Whether the directive was marked with `?`.
    pub optional: bool,
}

fn line_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*@(?:include|import)(\?)?\s+(\S+)\s*$").expect("valid directive regex")
    })
}

fn template_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\{\{#import(\?)?\s+([^}\s]+)\s*\}\}\s*$")
            .expect("valid template directive regex")
    })
}

fn strip_fragment(path: &str) -> &str {
    path.split_once('#').map_or(path, |(p, _)| p)
}

/// Find every include directive in a document, in order of appearance.
///
/// Frontmatter `imports:` entries come first and are required. Directives
/// inside fenced code blocks are ignored.
pub fn parse_directives(content: &str) -> Vec<IncludeDirective> {
    let mut found = Vec::new();

    if let Ok(meta) = parse_metadata("", content) {
        for import in meta.imports {
            let path = strip_fragment(&import).trim();
            if !path.is_empty() {
                found.push(IncludeDirective {
                    path: path.to_string(),
                    optional: false,
                });
            }
        }
    }

    let mut in_fence = false;
    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let caps = line_directive()
            .captures(line)
            .or_else(|| template_directive().captures(line));
        if let Some(caps) = caps {
            let path = strip_fragment(&caps[2]);
            if path.is_empty() {
                continue;
            }
            found.push(IncludeDirective {
                path: path.to_string(),
                optional: caps.get(1).is_some(),
            });
        }
    }
    found
}

/// Lexically normalise `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Normalise an install target and require it to stay below its root.
fn contained(path: &Path) -> Option<PathBuf> {
    let normalized = normalize(path);
    let inside = normalized.components().next().is_some()
        && normalized
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    inside.then_some(normalized)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Collector
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Local(PathBuf),
    Remote {
        slug: String,
        path: String,
        git_ref: String,
    },
}

impl Location {
    fn key(&self) -> String {
        match self {
            Location::Local(path) => path.display().to_string(),
            Location::Remote {
                slug,
                path,
                git_ref,
            } if git_ref.is_empty() => format!("{}/{}", slug, path),
            Location::Remote {
                slug,
                path,
                git_ref,
            } => format!("{}/{}@{}", slug, path, git_ref),
        }
    }
}

struct Pending {
    location: Location,
    target: PathBuf,
    optional: bool,
    depth: usize,
    directive: String,
    from: String,
}

/// Collects the transitive include set of a workflow document.
#[derive(Clone)]
pub struct DependencyCollector {
    host: SharedHost,
    shared_prefix: String,
}

impl DependencyCollector {
    /// Create a collector. `shared_prefix` marks includes resolved at the
    /// repository root (see the module docs).
    pub fn new(host: SharedHost, shared_prefix: impl Into<String>) -> Self {
        Self {
            host,
            shared_prefix: shared_prefix.into(),
        }
    }

    /// Collect the includes of a workflow read from `workflow_file` on disk.
    pub async fn collect_local(
        &self,
        content: &[u8],
        workflow_file: &Path,
    ) -> Result<Vec<IncludeDependency>> {
        let root = Location::Local(normalize(workflow_file));
        let target = workflow_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        self.collect(root, target, content).await
    }

    /// Collect the includes of a workflow read from `slug` at `source_path`
    /// and `git_ref`.
    pub async fn collect_remote(
        &self,
        content: &[u8],
        slug: &str,
        source_path: &str,
        git_ref: &str,
    ) -> Result<Vec<IncludeDependency>> {
        let root = Location::Remote {
            slug: slug.to_string(),
            path: source_path.to_string(),
            git_ref: git_ref.to_string(),
        };
        let target = Path::new(source_path)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        self.collect(root, target, content).await
    }

    async fn collect(
        &self,
        root: Location,
        root_target: PathBuf,
        content: &[u8],
    ) -> Result<Vec<IncludeDependency>> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(root.key());

        let mut queue: VecDeque<Pending> = VecDeque::new();
        self.enqueue_children(&mut queue, &root, &root_target, content, 0)?;

        let mut collected = Vec::new();
        while let Some(item) = queue.pop_front() {
            let key = item.location.key();
            if !seen.insert(key.clone()) {
                tracing::trace!(include = %key, "Include already collected");
                continue;
            }

            match self.read(&item.location).await {
                Ok(bytes) => {
                    self.enqueue_children(
                        &mut queue,
                        &item.location,
                        &item.target,
                        &bytes,
                        item.depth + 1,
                    )?;
                    tracing::debug!(
                        include = %key,
                        target = %item.target.display(),
                        "Collected include"
                    );
                    collected.push(IncludeDependency {
                        source_path: key,
                        target_path: item.target,
                        is_optional: item.optional,
                        content: bytes,
                    });
                }
                Err(e) if e.is_not_found() && item.optional => {
                    tracing::debug!(include = %key, "Optional include not found, skipping");
                }
                Err(e) if e.is_not_found() && item.depth == 0 => {
                    return Err(WorkflowError::IncludeNotFound {
                        path: item.directive,
                        from: item.from,
                    });
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        include = %item.directive,
                        from = %item.from,
                        "Nested include not found, dropping this branch"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(collected)
    }

    fn enqueue_children(
        &self,
        queue: &mut VecDeque<Pending>,
        parent: &Location,
        parent_target: &Path,
        content: &[u8],
        depth: usize,
    ) -> Result<()> {
        let text = String::from_utf8_lossy(content);
        for directive in parse_directives(&text) {
            let (location, target) = self.resolve_child(parent, parent_target, &directive.path);
            let target = contained(&target).ok_or_else(|| WorkflowError::UnsafeIncludePath {
                path: directive.path.clone(),
                from: parent.key(),
            })?;
            queue.push_back(Pending {
                location,
                target,
                optional: directive.optional,
                depth,
                directive: directive.path,
                from: parent.key(),
            });
        }
        Ok(())
    }

    /// Source location and install target of `include`, relative to the
    /// workflow directory. Targets are checked by the caller.
    fn resolve_child(
        &self,
        parent: &Location,
        parent_target: &Path,
        include: &str,
    ) -> (Location, PathBuf) {
        let relative_target = normalize(&parent_of(parent_target).join(include));
        match parent {
            Location::Local(file) => (
                Location::Local(normalize(&parent_of(file).join(include))),
                relative_target,
            ),
            Location::Remote {
                slug,
                path,
                git_ref,
            } => {
                if let Some(spec) = self.as_remote_spec(include) {
                    let target = PathBuf::from(include.split('@').next().unwrap_or(include));
                    let location = Location::Remote {
                        slug: spec.repo_slug,
                        path: spec.workflow_path,
                        git_ref: spec.version,
                    };
                    return (location, target);
                }
                if include.starts_with(&self.shared_prefix) {
                    let location = Location::Remote {
                        slug: slug.clone(),
                        path: to_slash(&normalize(Path::new(include))),
                        git_ref: git_ref.clone(),
                    };
                    return (location, normalize(Path::new(include)));
                }
                let source = normalize(&parent_of(Path::new(path)).join(include));
                let location = Location::Remote {
                    slug: slug.clone(),
                    path: to_slash(&source),
                    git_ref: git_ref.clone(),
                };
                (location, relative_target)
            }
        }
    }

    /// An include written as a full `owner/repo/path[@ref]` reference.
    fn as_remote_spec(&self, include: &str) -> Option<WorkflowSpec> {
        if include.starts_with('.')
            || include.starts_with('/')
            || include.starts_with(&self.shared_prefix)
        {
            return None;
        }
        let path_part = include.split('@').next().unwrap_or(include);
        if path_part.split('/').count() < 3 {
            return None;
        }
        WorkflowSpec::parse(include).ok().filter(|s| !s.is_local())
    }

    async fn read(&self, location: &Location) -> Result<Vec<u8>> {
        match location {
            Location::Local(path) => read_local_file(path).await,
            Location::Remote {
                slug,
                path,
                git_ref,
            } => {
                let git_ref = if git_ref.is_empty() {
                    self.host.default_branch(slug).await?
                } else {
                    git_ref.clone()
                };
                Ok(self.host.fetch_file(slug, path, &git_ref).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use flowtrial_host::MockHost;

    fn collector(host: MockHost) -> DependencyCollector {
        DependencyCollector::new(Arc::new(host), "shared/")
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn targets(deps: &[IncludeDependency]) -> Vec<String> {
        deps.iter()
            .map(|d| d.target_path.display().to_string())
            .collect()
    }

    #[test]
    fn test_parse_directives_forms() {
        let doc = "---\nimports:\n  - shared/a.md\n---\n\
                   @include b.md\n\
                   @include? c.md#Section\n\
                   @import d.md\n\
                   {{#import? e.md}}\n\
                   not @include f.md\n\
                   ```\n@include g.md\n```\n";
        let found = parse_directives(doc);
        let summary: Vec<(&str, bool)> =
            found.iter().map(|d| (d.path.as_str(), d.optional)).collect();
        assert_eq!(
            summary,
            vec![
                ("shared/a.md", false),
                ("b.md", false),
                ("c.md", true),
                ("d.md", false),
                ("e.md", true),
            ]
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/./b/../c.md")), PathBuf::from("a/c.md"));
        assert_eq!(normalize(Path::new("../x.md")), PathBuf::from("../x.md"));
        assert_eq!(normalize(Path::new("a/../../x.md")), PathBuf::from("../x.md"));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.md", "@include b.md\n");
        write(dir.path(), "b.md", "@include a.md\n@include b.md\n");

        let content = std::fs::read(&a).unwrap();
        let deps = collector(MockHost::new())
            .collect_local(&content, &a)
            .await
            .unwrap();
        assert_eq!(targets(&deps), vec!["b.md"]);
    }

    #[tokio::test]
    async fn test_diamond_collected_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "root.md", "@include x.md\n@include y.md\n");
        write(dir.path(), "x.md", "@include common.md\n");
        write(dir.path(), "y.md", "@include ./common.md\n");
        write(dir.path(), "common.md", "shared text");

        let content = std::fs::read(&root).unwrap();
        let deps = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap();
        assert_eq!(targets(&deps), vec!["x.md", "y.md", "common.md"]);
    }

    #[tokio::test]
    async fn test_optional_missing_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "root.md", "@include? missing.md\n@include present.md\n");
        write(dir.path(), "present.md", "here");

        let content = std::fs::read(&root).unwrap();
        let deps = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap();
        assert_eq!(targets(&deps), vec!["present.md"]);
        assert!(!deps[0].is_optional);
    }

    #[tokio::test]
    async fn test_required_missing_direct_include_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "root.md", "@include missing.md\n");

        let content = std::fs::read(&root).unwrap();
        let err = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::IncludeNotFound { ref path, .. } if path == "missing.md"));
    }

    #[tokio::test]
    async fn test_required_missing_nested_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "root.md", "@include a.md\n@include b.md\n");
        write(dir.path(), "a.md", "@include gone.md\n");
        write(dir.path(), "b.md", "b");

        let content = std::fs::read(&root).unwrap();
        let deps = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap();
        assert_eq!(targets(&deps), vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn test_local_targets_follow_directory_structure() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "flows/main.md", "@include shared/x.md#Tools\n");
        write(dir.path(), "flows/shared/x.md", "@include ../common.md\n");
        write(dir.path(), "flows/common.md", "c");

        let content = std::fs::read(&root).unwrap();
        let deps = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap();
        assert_eq!(targets(&deps), vec!["shared/x.md", "common.md"]);
        assert!(deps[1].source_path.ends_with("flows/common.md"));
    }

    #[tokio::test]
    async fn test_remote_addressing_modes() {
        let host = MockHost::new()
            .with_file("octo/agents", "workflows/main.md", "unused")
            .with_file("octo/agents", "shared/tools.md", "@include? nope.md\n")
            .with_file("octo/agents", "workflows/helpers/fmt.md", "fmt")
            .with_file("other/lib", "docs/extra.md", "extra");
        let root = "@include shared/tools.md\n\
                    @include helpers/fmt.md\n\
                    @include other/lib/docs/extra.md@v2\n";

        let deps = collector(host)
            .collect_remote(root.as_bytes(), "octo/agents", "workflows/main.md", "sha1")
            .await
            .unwrap();

        let summary: Vec<(String, String)> = deps
            .iter()
            .map(|d| (d.source_path.clone(), d.target_path.display().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("octo/agents/shared/tools.md@sha1".into(), "shared/tools.md".into()),
                ("octo/agents/workflows/helpers/fmt.md@sha1".into(), "helpers/fmt.md".into()),
                ("other/lib/docs/extra.md@v2".into(), "other/lib/docs/extra.md".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_include_escaping_workflow_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "src/a/b/c/w.md", "@include ../../../shared.md\n");
        write(dir.path(), "src/shared.md", "shared");

        let content = std::fs::read(&root).unwrap();
        let err = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap_err();
        match err {
            WorkflowError::UnsafeIncludePath { path, .. } => assert_eq!(path, "../../../shared.md"),
            other => panic!("expected unsafe include, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_absolute_and_remote_escapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let notes = write(dir.path(), "notes.md", "n");
        let root = write(dir.path(), "w.md", &format!("@include? {}\n", notes.display()));
        let content = std::fs::read(&root).unwrap();
        let err = collector(MockHost::new())
            .collect_local(&content, &root)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnsafeIncludePath { .. }));

        let host = MockHost::new().with_file("o/r", "y.md", "y");
        let err = collector(host)
            .collect_remote(
                b"@include o/r/x/../../../../../../y.md\n",
                "o/r",
                "workflows/main.md",
                "main",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnsafeIncludePath { .. }));
    }

    #[test]
    fn test_contained_targets() {
        assert_eq!(contained(Path::new("a/./b/../c.md")), Some(PathBuf::from("a/c.md")));
        assert_eq!(contained(Path::new("../x.md")), None);
        assert_eq!(contained(Path::new("/etc/x.md")), None);
        assert_eq!(contained(Path::new("a/..")), None);
    }

    #[tokio::test]
    async fn test_remote_cycle_terminates() {
        let host = MockHost::new()
            .with_file("o/r", "workflows/a.md", "@include b.md\n")
            .with_file("o/r", "workflows/b.md", "@include a.md\n");
        let deps = collector(host)
            .collect_remote(b"@include b.md\n", "o/r", "workflows/a.md", "main")
            .await
            .unwrap();
        assert_eq!(targets(&deps), vec!["b.md"]);
    }
}
