//! Orders: one unit of scheduled work per observed branch advance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::OrderId;

/// A watched repository as seen by workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Repository name from the process configuration.
    pub name: String,
    /// Remote URL (or local path) of the repository.
    pub url: String,
    /// Local mirror kept up to date by the watcher, if any.
    pub mirror: Option<PathBuf>,
}

impl RepoHandle {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: impl Into<PathBuf>) -> Self {
        self.mirror = Some(mirror.into());
        self
    }

    /// Where working clones should be made from: the mirror when present,
    /// the remote otherwise.
    pub fn clone_source(&self) -> String {
        match &self.mirror {
            Some(path) => path.to_string_lossy().to_string(),
            None => self.url.clone(),
        }
    }
}

/// A request to build one commit of one branch.
///
/// Orders are immutable and consumed by exactly one worker. Two orders for
/// the same commit are allowed; they just build twice.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub repo: Arc<RepoHandle>,
    pub branch: String,
    pub commit: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(repo: Arc<RepoHandle>, branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            id: OrderId::new(),
            repo,
            branch: branch.into(),
            commit: commit.into(),
            created_at: Utc::now(),
        }
    }

    pub fn repo_name(&self) -> &str {
        &self.repo.name
    }

    pub fn short_commit(&self) -> &str {
        short_sha(&self.commit)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.repo.name, self.branch, self.short_commit())
    }
}

/// First seven characters of a commit id.
pub fn short_sha(commit: &str) -> &str {
    match commit.char_indices().nth(7) {
        Some((idx, _)) => &commit[..idx],
        None => commit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_short_sha() {
        let repo = Arc::new(RepoHandle::new("app", "https://example.com/app.git"));
        let order = Order::new(repo, "feature/login", "0123456789abcdef");
        assert_eq!(order.to_string(), "app@feature/login:0123456");
        assert_eq!(order.repo_name(), "app");
    }

    #[test]
    fn test_short_sha_of_short_input() {
        assert_eq!(short_sha("abc"), "abc");
        assert_eq!(short_sha(""), "");
    }

    #[test]
    fn test_clone_source_prefers_mirror() {
        let repo = RepoHandle::new("app", "https://example.com/app.git");
        assert_eq!(repo.clone_source(), "https://example.com/app.git");

        let repo = repo.with_mirror("/data/mirrors/app");
        assert_eq!(repo.clone_source(), "/data/mirrors/app");
    }
}
