//! Workflow resolution for flowtrial.
//!
//! Turns workflow reference strings into self-contained bundles ready to be
//! installed somewhere else:
//!
//! ```text
//! "owner/repo/name@v1"  ──parse──▶ WorkflowSpec
//!                       ──fetch──▶ FetchedWorkflow (content + commit SHA)
//!                       ──collect▶ Vec<IncludeDependency>
//!                       ──derive─▶ ResolvedWorkflow (description, engine, dispatch)
//! ```
//!
//! Local references (`./path.md`, optionally with `*`/`**`) are read from a
//! base directory passed in explicitly; remote references go through a
//! [`flowtrial_host::HostingService`].

pub mod error;
pub mod fetch;
pub mod frontmatter;
pub mod includes;
pub mod resolver;
pub mod spec;

pub use error::{Result, WorkflowError};
pub use fetch::{FetchedWorkflow, SourceFetcher};
pub use frontmatter::{WorkflowMetadata, parse_metadata, split_frontmatter};
pub use includes::{DependencyCollector, IncludeDependency, IncludeDirective, parse_directives};
pub use resolver::{ResolvedWorkflow, ResolvedWorkflows, WorkflowResolver};
pub use spec::WorkflowSpec;

/// Default prefix of include paths resolved against the repository root.
pub const DEFAULT_SHARED_PREFIX: &str = "shared/";
