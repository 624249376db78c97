//! Per-order working directories.

use crate::command::{GitError, git, is_work_tree};
use async_trait::async_trait;
use distonic_core::context::dash_branch;
use distonic_core::{Error, RepoHandle, Result, WorkdirProvider};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Working directories laid out as `<root>/<repo>/<branch>/<commit>`.
///
/// An existing checkout for a key is reused; every call force-resets it to
/// the commit and removes untracked files. Calls for the same key are
/// serialized.
pub struct GitWorkdirs {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    clones: AtomicUsize,
}

impl GitWorkdirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
            clones: AtomicUsize::new(0),
        }
    }

    /// Working directories under `<data_dir>/worker`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("worker"))
    }

    /// Path of the working directory for a key.
    pub fn path_for(&self, repo: &str, branch: &str, commit: &str) -> PathBuf {
        self.root.join(repo).join(dash_branch(branch)).join(commit)
    }

    /// Number of fresh clones made so far.
    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::Relaxed)
    }

    fn key_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    fn release_key(&self, path: &Path) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(path).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(path);
        }
    }

    async fn prepare(
        &self,
        repo: &RepoHandle,
        commit: &str,
        path: &Path,
    ) -> std::result::Result<(), GitError> {
        if is_work_tree(path).await {
            debug!(path = %path.display(), "Reusing working clone");
        } else {
            if path.exists() {
                warn!(path = %path.display(), "Removing stale working directory");
                tokio::fs::remove_dir_all(path).await?;
            }
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let source = repo.clone_source();
            info!(repo = %repo.name, source = %source, path = %path.display(), "Making working clone");
            let target = path.to_string_lossy().to_string();
            git(None, ["clone", "--quiet", "--no-checkout", source.as_str(), target.as_str()])
                .await
                .map_err(|e| GitError::CloneFailed(e.to_string()))?;
            self.clones.fetch_add(1, Ordering::Relaxed);
        }

        if git(Some(path), ["checkout", "--quiet", "--force", "--detach", commit])
            .await
            .is_err()
        {
            // The clone may predate the commit.
            debug!(path = %path.display(), commit = %commit, "Commit not found, fetching");
            git(Some(path), ["fetch", "--quiet", "origin"]).await?;
            git(Some(path), ["checkout", "--quiet", "--force", "--detach", commit]).await?;
        }

        git(Some(path), ["reset", "--quiet", "--hard", commit]).await?;
        git(Some(path), ["clean", "-ffdxq"]).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkdirProvider for GitWorkdirs {
    async fn ensure_workdir(
        &self,
        repo: &RepoHandle,
        branch: &str,
        commit: &str,
    ) -> Result<PathBuf> {
        validate_component("repository name", &repo.name)?;
        if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!("not a commit id: {:?}", commit)));
        }
        if branch.is_empty() || branch.split('/').any(|part| part == "..") {
            return Err(Error::InvalidInput(format!("invalid branch: {:?}", branch)));
        }

        let path = self.path_for(&repo.name, branch, commit);
        let lock = self.key_lock(&path);
        let result = {
            let _guard = lock.lock().await;
            self.prepare(repo, commit, &path).await
        };
        drop(lock);
        self.release_key(&path);

        match result {
            Ok(()) => {
                info!(path = %path.display(), "Working dir is ready");
                Ok(path)
            }
            Err(e) => {
                warn!(
                    repo = %repo.name,
                    branch = %branch,
                    commit = %commit,
                    error = %e,
                    "Cannot prepare working dir"
                );
                Err(e.into())
            }
        }
    }
}

fn validate_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(Error::InvalidInput(format!("invalid {}: {:?}", what, value)));
    }
    Ok(())
}
