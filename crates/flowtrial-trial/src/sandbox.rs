//! Sandbox repository lifecycle.
//!
//! ```text
//! Absent ──────────────────────────▶ Created   (operator confirms first)
//! Present ─────────────────────────▶ Reused
//! Present ──force delete──▶ Absent ─▶ Recreated
//! ```
//!
//! Creation and deletion are the only mutations. When the caller plans to
//! seed content (clone mode) an existing sandbox is reused as-is, since the
//! seeding push overwrites it anyway.

use std::sync::Arc;

use flowtrial_host::{CreateRepoOptions, SharedHost};

use crate::{Result, TrialError};

/// Outcome of [`SandboxManager::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// The repository did not exist and was created.
    Created,
    /// The existing repository was kept.
    Reused,
    /// The existing repository was deleted and created again.
    Recreated,
}

/// Synchronous yes/no question to the operator.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers yes to everything (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Creates, reuses, re-creates, and deletes sandbox repositories.
#[derive(Clone)]
pub struct SandboxManager {
    host: SharedHost,
    confirmer: Arc<dyn Confirmer>,
}

impl SandboxManager {
    pub fn new(host: SharedHost, confirmer: Arc<dyn Confirmer>) -> Self {
        Self { host, confirmer }
    }

    /// Make sure `slug` exists and is ready for a trial.
    pub async fn ensure(
        &self,
        slug: &str,
        force_delete: bool,
        will_seed: bool,
    ) -> Result<SandboxState> {
        let exists = self.host.repo_exists(slug).await?;

        if !exists {
            if force_delete {
                tracing::debug!(repo = slug, "Sandbox absent, nothing to delete");
            }
            let prompt = format!(
                "Repository {} will be created as a private trial sandbox.\n\
                 Once created, allow GitHub Actions to create and approve pull requests \
                 in its Settings > Actions before runs need it. Continue?",
                slug
            );
            if !self.confirmer.confirm(&prompt) {
                return Err(TrialError::Sandbox {
                    repo: slug.to_string(),
                    message: "creation not confirmed".to_string(),
                });
            }
            self.create(slug).await?;
            tracing::info!(repo = slug, "Created sandbox repository");
            return Ok(SandboxState::Created);
        }

        if force_delete {
            self.delete(slug).await?;
            self.create(slug).await?;
            tracing::info!(repo = slug, "Re-created sandbox repository");
            return Ok(SandboxState::Recreated);
        }

        if will_seed {
            tracing::info!(repo = slug, "Reusing sandbox; its content will be overwritten");
        } else {
            tracing::info!(repo = slug, "Reusing existing sandbox repository");
        }
        Ok(SandboxState::Reused)
    }

    /// Delete the sandbox.
    pub async fn delete(&self, slug: &str) -> Result<()> {
        self.host
            .delete_repo(slug)
            .await
            .map_err(|e| TrialError::Sandbox {
                repo: slug.to_string(),
                message: format!("delete failed: {}", e),
            })?;
        tracing::info!(repo = slug, "Deleted sandbox repository");
        Ok(())
    }

    async fn create(&self, slug: &str) -> Result<()> {
        let options = CreateRepoOptions {
            description: "Sandbox for agentic workflow trials".to_string(),
            ..Default::default()
        };
        self.host
            .create_repo(slug, &options)
            .await
            .map_err(|e| TrialError::Sandbox {
                repo: slug.to_string(),
                message: format!("create failed: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use flowtrial_host::MockHost;

    struct CountingConfirm {
        answer: bool,
        asked: AtomicUsize,
    }

    impl Confirmer for CountingConfirm {
        fn confirm(&self, _prompt: &str) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn counting(answer: bool) -> Arc<CountingConfirm> {
        Arc::new(CountingConfirm {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_create_when_absent() {
        let host = Arc::new(MockHost::new());
        let confirm = counting(true);
        let manager = SandboxManager::new(host.clone(), confirm.clone());

        let state = manager.ensure("me/box", false, false).await.unwrap();
        assert_eq!(state, SandboxState::Created);
        assert!(host.has_repo("me/box"));
        assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_declined_confirmation_creates_nothing() {
        let host = Arc::new(MockHost::new());
        let manager = SandboxManager::new(host.clone(), counting(false));

        let err = manager.ensure("me/box", false, false).await.unwrap_err();
        assert!(matches!(err, TrialError::Sandbox { .. }));
        assert!(!host.has_repo("me/box"));
    }

    #[tokio::test]
    async fn test_ensure_twice_is_idempotent() {
        let host = Arc::new(MockHost::new());
        let confirm = counting(true);
        let manager = SandboxManager::new(host.clone(), confirm.clone());

        manager.ensure("me/box", false, false).await.unwrap();
        let second = manager.ensure("me/box", false, false).await.unwrap();
        assert_eq!(second, SandboxState::Reused);
        assert_eq!(host.call_count("create_repo"), 1);
        assert_eq!(host.call_count("delete_repo"), 0);
        assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_delete_recreates() {
        let host = Arc::new(MockHost::new().with_repo("me/box"));
        let confirm = counting(true);
        let manager = SandboxManager::new(host.clone(), confirm.clone());

        let state = manager.ensure("me/box", true, false).await.unwrap();
        assert_eq!(state, SandboxState::Recreated);
        assert_eq!(host.call_count("delete_repo"), 1);
        assert_eq!(host.call_count("create_repo"), 1);
        assert_eq!(confirm.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_delete_when_absent_just_creates() {
        let host = Arc::new(MockHost::new());
        let manager = SandboxManager::new(host.clone(), Arc::new(AutoConfirm));

        let state = manager.ensure("me/box", true, false).await.unwrap();
        assert_eq!(state, SandboxState::Created);
        assert_eq!(host.call_count("delete_repo"), 0);
    }

    #[tokio::test]
    async fn test_seeding_reuses_without_delete() {
        let host = Arc::new(MockHost::new().with_repo("me/box"));
        let manager = SandboxManager::new(host.clone(), Arc::new(AutoConfirm));

        let state = manager.ensure("me/box", false, true).await.unwrap();
        assert_eq!(state, SandboxState::Reused);
        assert_eq!(host.call_count("delete_repo"), 0);
    }

    #[tokio::test]
    async fn test_delete_failure_is_sandbox_error() {
        let host = Arc::new(MockHost::new().with_repo("me/box").fail_on("delete_repo"));
        let manager = SandboxManager::new(host.clone(), Arc::new(AutoConfirm));

        let err = manager.ensure("me/box", true, false).await.unwrap_err();
        assert!(err.to_string().contains("delete failed"));
        assert_eq!(host.call_count("create_repo"), 0);
    }
}
