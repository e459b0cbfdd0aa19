//! Change tracking for file-writing operations.
//!
//! Every file written while installing workflows goes through a
//! [`ChangeTracker`], which remembers whether the file is new or replaced an
//! existing one (keeping the original bytes). The tracked set can be staged
//! for commit, or rolled back when a later step fails.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use flowtrial_host::VersionControl;

use crate::{Result, TrialError};

/// Records files created and modified under a root directory.
#[derive(Debug)]
pub struct ChangeTracker {
    root: PathBuf,
    created: BTreeSet<PathBuf>,
    modified: BTreeMap<PathBuf, Vec<u8>>,
}

impl ChangeTracker {
    /// Track changes below `root`. Paths handed to the tracker are relative
    /// to it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            created: BTreeSet::new(),
            modified: BTreeMap::new(),
        }
    }

    /// Directory all tracked paths are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Note the current state of `rel` before something else writes it.
    ///
    /// The first observation wins: a file created earlier in the same
    /// operation stays "created", and a modified file keeps its original
    /// bytes.
    pub async fn track(&mut self, rel: &Path) -> Result<()> {
        let rel = relative(rel)?;
        if self.created.contains(&rel) || self.modified.contains_key(&rel) {
            return Ok(());
        }
        match tokio::fs::read(self.root.join(&rel)).await {
            Ok(original) => {
                self.modified.insert(rel, original);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.created.insert(rel);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Write `content` to `rel`, creating parent directories.
    ///
    /// Returns `false` (and records nothing) when the file already holds
    /// exactly this content.
    pub async fn write_file(&mut self, rel: &Path, content: &[u8]) -> Result<bool> {
        let rel = &relative(rel)?;
        let path = self.root.join(rel);
        if let Ok(existing) = tokio::fs::read(&path).await
            && existing == content
        {
            return Ok(false);
        }
        self.track(rel).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!(path = %rel.display(), "Wrote file");
        Ok(true)
    }

    /// Files that did not exist before.
    pub fn created(&self) -> Vec<PathBuf> {
        self.created.iter().cloned().collect()
    }

    /// Files that existed and were overwritten.
    pub fn modified(&self) -> Vec<PathBuf> {
        self.modified.keys().cloned().collect()
    }

    /// Every tracked file, sorted and deduplicated.
    pub fn all(&self) -> Vec<PathBuf> {
        let mut all: BTreeSet<PathBuf> = self.created.clone();
        all.extend(self.modified.keys().cloned());
        all.into_iter().collect()
    }

    /// Whether nothing has been tracked.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty()
    }

    /// Stage every tracked file that still exists.
    pub async fn stage(&self, vcs: &dyn VersionControl) -> Result<()> {
        let paths: Vec<PathBuf> = self
            .all()
            .into_iter()
            .filter(|p| self.root.join(p).exists())
            .collect();
        if paths.is_empty() {
            return Ok(());
        }
        vcs.add_paths(&self.root, &paths).await?;
        Ok(())
    }

    /// Undo every tracked change: remove created files and restore the
    /// original content of modified ones. The tracker is empty afterwards.
    pub async fn rollback(&mut self) -> Result<()> {
        for rel in std::mem::take(&mut self.created) {
            let path = self.root.join(&rel);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %rel.display(), "Removed created file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        for (rel, original) in std::mem::take(&mut self.modified) {
            tokio::fs::write(self.root.join(&rel), original).await?;
            tracing::debug!(path = %rel.display(), "Restored modified file");
        }
        Ok(())
    }
}

/// Strip `.` components from `rel` and refuse anything that could leave
/// the root.
fn relative(rel: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(TrialError::UnsafePath {
                    path: rel.to_path_buf(),
                });
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(TrialError::UnsafePath {
            path: rel.to_path_buf(),
        });
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrial_host::MockVcs;

    #[tokio::test]
    async fn test_created_vs_modified() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.md"), "old").unwrap();

        let mut tracker = ChangeTracker::new(dir.path());
        assert!(tracker.write_file(Path::new("new/a.md"), b"a").await.unwrap());
        assert!(tracker.write_file(Path::new("existing.md"), b"new").await.unwrap());
        // Second write to a created file keeps it "created"
        assert!(tracker.write_file(Path::new("new/a.md"), b"a2").await.unwrap());

        assert_eq!(tracker.created(), vec![PathBuf::from("new/a.md")]);
        assert_eq!(tracker.modified(), vec![PathBuf::from("existing.md")]);
        assert_eq!(
            tracker.all(),
            vec![PathBuf::from("existing.md"), PathBuf::from("new/a.md")]
        );
    }

    #[tokio::test]
    async fn test_identical_write_is_not_tracked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("same.md"), "same").unwrap();

        let mut tracker = ChangeTracker::new(dir.path());
        assert!(!tracker.write_file(Path::new("same.md"), b"same").await.unwrap());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.md"), "original").unwrap();

        let mut tracker = ChangeTracker::new(dir.path());
        tracker.write_file(Path::new("keep.md"), b"changed").await.unwrap();
        tracker.write_file(Path::new("fresh.md"), b"fresh").await.unwrap();
        tracker.write_file(Path::new("keep.md"), b"changed again").await.unwrap();

        tracker.rollback().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("keep.md")).unwrap(),
            "original"
        );
        assert!(!dir.path().join("fresh.md").exists());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_paths_outside_root_are_refused() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("repo");
        std::fs::create_dir(&root).unwrap();
        let outside = parent.path().join("escaped.md");

        let mut tracker = ChangeTracker::new(&root);
        for rel in [
            PathBuf::from("../escaped.md"),
            PathBuf::from(".github/workflows/../../../escaped.md"),
            outside.clone(),
            PathBuf::from("."),
        ] {
            let err = tracker.write_file(&rel, b"x").await.unwrap_err();
            assert!(matches!(err, TrialError::UnsafePath { .. }), "{}", rel.display());
        }
        assert!(tracker.track(Path::new("../escaped.md")).await.is_err());
        assert!(!outside.exists());
        assert!(tracker.is_empty());

        assert!(tracker.write_file(Path::new("./a/./b.md"), b"b").await.unwrap());
        assert_eq!(tracker.created(), vec![PathBuf::from("a/b.md")]);
    }

    #[tokio::test]
    async fn test_track_before_external_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::new(dir.path());
        tracker.track(Path::new("w.lock.yml")).await.unwrap();
        std::fs::write(dir.path().join("w.lock.yml"), "compiled").unwrap();
        assert_eq!(tracker.created(), vec![PathBuf::from("w.lock.yml")]);
    }

    #[tokio::test]
    async fn test_stage_adds_tracked_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::new(dir.path());
        tracker.write_file(Path::new("b.md"), b"b").await.unwrap();
        tracker.write_file(Path::new("a.md"), b"a").await.unwrap();
        // Tracked but never written by anyone
        tracker.track(Path::new("ghost.lock.yml")).await.unwrap();

        let vcs = MockVcs::new();
        tracker.stage(&vcs).await.unwrap();
        assert_eq!(vcs.calls(), vec!["add_paths a.md,b.md".to_string()]);
    }
}
