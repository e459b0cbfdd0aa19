//! Workflow reference parsing.
//!
//! Four shapes are recognised:
//!
//! | shape | example |
//! |---|---|
//! | three segments, implicit directory | `octo/agents/triage@v1` |
//! | four or more segments, explicit `.md` | `octo/agents/flows/triage.md@main` |
//! | hosting-platform URL | `https://github.com/octo/agents/blob/main/flows/triage.md` |
//! | local path, globs allowed | `./flows/*.md` |
//!
//! Parsing is pure: no file system or network access.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use url::Url;

use crate::{Result, WorkflowError};

/// Immutable descriptor of one workflow reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkflowSpec {
    /// `owner/name`, or empty for local references.
    pub repo_slug: String,
    /// Branch, tag, or SHA. Empty means the default branch.
    pub version: String,
    /// Path within the repository, or the local path as written.
    pub workflow_path: String,
    /// Stem of the workflow file.
    pub workflow_name: String,
    /// Whether the path contains a glob.
    pub is_wildcard: bool,
}

impl WorkflowSpec {
    /// Parse a reference string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::invalid(input, "reference is empty"));
        }

        if is_local_reference(trimmed) {
            return parse_local(trimmed);
        }
        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            return parse_url(trimmed);
        }
        parse_remote(trimmed)
    }

    /// A non-wildcard local spec for a concrete path (used for glob matches).
    pub fn local(path: impl Into<String>) -> Self {
        let workflow_path = path.into();
        let workflow_name = file_stem(&workflow_path);
        Self {
            repo_slug: String::new(),
            version: String::new(),
            workflow_path,
            workflow_name,
            is_wildcard: false,
        }
    }

    /// Whether the spec refers to the local file system.
    pub fn is_local(&self) -> bool {
        self.repo_slug.is_empty()
    }

    /// Key identifying the same workflow at the same ref.
    pub(crate) fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.repo_slug.to_ascii_lowercase(),
            self.workflow_path,
            self.version
        )
    }
}

impl fmt::Display for WorkflowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            return write!(f, "{}", self.workflow_path);
        }
        write!(f, "{}/{}", self.repo_slug, self.workflow_path)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        Ok(())
    }
}

fn is_local_reference(s: &str) -> bool {
    s.starts_with("./") || s.starts_with("../") || s.starts_with('/')
}

fn has_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parse_local(input: &str) -> Result<WorkflowSpec> {
    let is_wildcard = has_glob(input);
    if !is_wildcard && !input.ends_with(".md") {
        return Err(WorkflowError::invalid(
            input,
            "local workflow paths must end with .md",
        ));
    }
    let mut spec = WorkflowSpec::local(input);
    spec.is_wildcard = is_wildcard;
    Ok(spec)
}

fn parse_remote(input: &str) -> Result<WorkflowSpec> {
    let (path_part, version) = match input.split_once('@') {
        Some((_, "")) => return Err(WorkflowError::invalid(input, "empty ref after '@'")),
        Some((path, version)) => (path, version),
        None => (input, ""),
    };

    let segments: Vec<&str> = path_part.split('/').collect();
    if segments.len() >= 2 && has_glob(path_part) {
        return Err(WorkflowError::RemoteWildcard(input.to_string()));
    }
    if segments.len() < 3 {
        return Err(WorkflowError::invalid(
            input,
            "expected at least owner/repo/name",
        ));
    }
    if segments.iter().any(|s| s.is_empty() || s.contains(char::is_whitespace)) {
        return Err(WorkflowError::invalid(input, "empty or malformed path segment"));
    }
    if version.contains(char::is_whitespace) {
        return Err(WorkflowError::invalid(input, "ref contains whitespace"));
    }

    let repo_slug = format!("{}/{}", segments[0], segments[1]);
    let rest = segments[2..].join("/");

    let workflow_path = if segments.len() == 3 {
        // Bare name; the fetcher searches the conventional directories
        if rest.ends_with(".md") {
            rest
        } else {
            format!("{}.md", rest)
        }
    } else if rest.ends_with(".md") {
        rest
    } else {
        return Err(WorkflowError::invalid(
            input,
            "paths with four or more segments must end with .md",
        ));
    };

    Ok(WorkflowSpec {
        repo_slug,
        version: version.to_string(),
        workflow_name: file_stem(&workflow_path),
        workflow_path,
        is_wildcard: false,
    })
}

fn parse_url(input: &str) -> Result<WorkflowSpec> {
    let url = Url::parse(input).map_err(|e| WorkflowError::invalid(input, e.to_string()))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let (owner, repo, version, path) = match url.host_str() {
        Some("github.com") | Some("www.github.com") => match segments.as_slice() {
            [owner, repo, kind, version, path @ ..]
                if matches!(*kind, "blob" | "tree" | "raw") && !path.is_empty() =>
            {
                (*owner, *repo, *version, path.join("/"))
            }
            _ => {
                return Err(WorkflowError::invalid(
                    input,
                    "expected https://github.com/owner/repo/blob/<ref>/<path>.md",
                ));
            }
        },
        Some("raw.githubusercontent.com") => match segments.as_slice() {
            [owner, repo, version, path @ ..] if !path.is_empty() => {
                (*owner, *repo, *version, path.join("/"))
            }
            _ => {
                return Err(WorkflowError::invalid(
                    input,
                    "expected https://raw.githubusercontent.com/owner/repo/<ref>/<path>.md",
                ));
            }
        },
        other => {
            return Err(WorkflowError::invalid(
                input,
                format!("unsupported host '{}'", other.unwrap_or_default()),
            ));
        }
    };

    if has_glob(&path) {
        return Err(WorkflowError::RemoteWildcard(input.to_string()));
    }
    if !path.ends_with(".md") {
        return Err(WorkflowError::invalid(input, "URL must point at a .md file"));
    }

    Ok(WorkflowSpec {
        repo_slug: format!("{}/{}", owner, repo),
        version: version.to_string(),
        workflow_name: file_stem(&path),
        workflow_path: path,
        is_wildcard: false,
    })
}
