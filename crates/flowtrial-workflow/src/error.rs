//! Error types for workflow resolution.

use std::path::PathBuf;

use flowtrial_host::HostError;
use thiserror::Error;

/// Result type alias using the workflow error type.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Shapes accepted by the reference parser, quoted in format errors.
pub(crate) const EXPECTED_SHAPES: &str = "owner/repo/name[@ref], owner/repo/path/to/file.md[@ref], \
     a https://github.com/... URL, or a local ./path.md \
     (e.g. githubnext/agentics/daily-plan@main)";

/// Errors that can occur while resolving workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A reference string matched none of the accepted shapes.
    #[error("invalid workflow reference '{input}': {reason}; expected {EXPECTED_SHAPES}")]
    InvalidSpec { input: String, reason: String },

    /// A remote reference contained a glob.
    #[error("wildcards only supported for local workflows: '{0}'")]
    RemoteWildcard(String),

    /// A remote reference points at the repository being installed into.
    #[error("cannot add workflows from the current repository '{0}'; use a local ./path instead")]
    SelfReference(String),

    /// Nothing left to resolve.
    #[error("{0}")]
    NoWorkflows(String),

    /// A workflow file could not be found.
    #[error("workflow not found: {0}")]
    NotFound(String),

    /// A required include directly referenced by a workflow is missing.
    #[error("include '{path}' referenced from '{from}' not found")]
    IncludeNotFound { path: String, from: String },

    /// An include would be installed outside the workflow directory.
    #[error("include '{path}' referenced from '{from}' resolves outside the workflow directory")]
    UnsafeIncludePath { path: String, from: String },

    /// Two references resolve to the same installed file name.
    #[error("workflows '{first}' and '{second}' would both be installed as '{name}'")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    /// Frontmatter is present but is not valid YAML.
    #[error("invalid frontmatter in {path}: {message}")]
    Frontmatter { path: String, message: String },

    /// Hosting service failure.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Local file system failure.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl WorkflowError {
    pub(crate) fn invalid(input: &str, reason: impl Into<String>) -> Self {
        WorkflowError::InvalidSpec {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkflowError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the referenced file does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkflowError::NotFound(_) | WorkflowError::IncludeNotFound { .. } => true,
            WorkflowError::Host(e) => e.is_not_found(),
            WorkflowError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
