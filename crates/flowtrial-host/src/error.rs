//! Error types for hosting and version-control operations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the host error type.
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors surfaced by the hosting service and version-control abstractions.
///
/// The first four variants are the recognised remote conditions callers act
/// on (fall back, skip, report); everything else is opaque.
#[derive(Debug, Error)]
pub enum HostError {
    /// The CLI is not authenticated or the token lacks access.
    #[error("authentication required: {0}")]
    Unauthorized(String),

    /// The repository, file, ref, or run does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote rejected the change because of conflicting state
    /// (repository already exists, non-fast-forward push, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A run produced no downloadable artifacts.
    #[error("no artifacts found for run {0}")]
    NoArtifacts(u64),

    /// A CLI invocation exceeded its time budget.
    #[error("{program} timed out after {elapsed:?}")]
    Timeout { program: String, elapsed: Duration },

    /// A CLI invocation could not be started.
    #[error("failed to run {program}: {source}")]
    Command {
        program: String,
        source: std::io::Error,
    },

    /// CLI output could not be parsed.
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// IO error on local files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything the boundary could not classify.
    #[error("{0}")]
    Unknown(String),
}

impl HostError {
    /// Whether this error means the remote object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound(_))
    }

    /// Classify the stderr of a failed `gh` or `git` invocation.
    ///
    /// This is the only place error prose is inspected.
    pub fn classify(stderr: &str) -> Self {
        let text = stderr.trim();
        let lower = text.to_ascii_lowercase();

        if lower.contains("http 401")
            || lower.contains("gh auth login")
            || lower.contains("authentication required")
            || lower.contains("bad credentials")
            || lower.contains("requires authentication")
        {
            return HostError::Unauthorized(text.to_string());
        }

        if lower.contains("http 404")
            || lower.contains("not found")
            || lower.contains("could not resolve to a repository")
            || lower.contains("no commit found for sha")
        {
            return HostError::NotFound(text.to_string());
        }

        if lower.contains("http 409")
            || lower.contains("already exists")
            || lower.contains("non-fast-forward")
            || lower.contains("[rejected]")
            || lower.contains("fetch first")
        {
            return HostError::Conflict(text.to_string());
        }

        HostError::Unknown(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unauthorized() {
        let err = HostError::classify("To get started with GitHub CLI, please run:  gh auth login");
        assert!(matches!(err, HostError::Unauthorized(_)));
        let err = HostError::classify("gh: Bad credentials (HTTP 401)");
        assert!(matches!(err, HostError::Unauthorized(_)));
    }

    #[test]
    fn test_classify_not_found() {
        let err = HostError::classify("gh: Not Found (HTTP 404)");
        assert!(err.is_not_found());
        let err = HostError::classify(
            "GraphQL: Could not resolve to a Repository with the name 'me/missing'.",
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_conflict() {
        let err = HostError::classify(
            " ! [rejected]        main -> main (fetch first)\nerror: failed to push some refs",
        );
        assert!(matches!(err, HostError::Conflict(_)));
        let err = HostError::classify("GraphQL: Name already exists on this account (createRepository)");
        assert!(matches!(err, HostError::Conflict(_)));
    }

    #[test]
    fn test_classify_unknown_keeps_detail() {
        let err = HostError::classify("  something odd happened \n");
        match err {
            HostError::Unknown(detail) => assert_eq!(detail, "something odd happened"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
