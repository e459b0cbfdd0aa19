//! Hosting platform and version-control abstractions.
//!
//! The trial lifecycle talks to two external systems: the hosting platform
//! (repositories, secrets, workflow dispatch, runs, artifacts, pull requests)
//! and the local version-control tool. Both are consumed through traits so
//! the resolver and orchestrator never depend on a concrete CLI:
//!
//! - [`HostingService`], implemented by [`GhCli`] on top of the `gh` binary
//! - [`VersionControl`], implemented by [`GitCli`] on top of `git`
//!
//! Errors cross the boundary as a typed [`HostError`]; the text of a failed
//! CLI invocation is classified once, where the command runs.
//!
//! Enable the `testing` feature for [`MockHost`] and [`MockVcs`].

pub mod error;
pub mod gh;
pub mod git;
pub mod process;
pub mod service;
pub mod types;
pub mod vcs;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use error::{HostError, Result};
pub use gh::GhCli;
pub use git::{GitCli, parse_remote_slug};
pub use process::CommandOutput;
pub use service::{HostingService, SharedHost};
pub use types::{
    CreateRepoOptions, PullRequest, RepoEdit, RunConclusion, RunStatus, WorkflowEntry,
    WorkflowRun, split_slug, validate_slug,
};
pub use vcs::{SharedVcs, VersionControl};

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockHost, MockRun, MockVcs};
