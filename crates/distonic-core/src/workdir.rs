//! Working directories for orders.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::{RepoHandle, Result};

/// Materializes a checkout of an exact (repository, branch, commit) triple.
///
/// Implementations must reuse an existing directory for the same key, reset
/// it to `commit` and remove anything a previous build left behind.
/// Concurrent calls for the same key must not race on the same path.
#[async_trait]
pub trait WorkdirProvider: Send + Sync {
    async fn ensure_workdir(&self, repo: &RepoHandle, branch: &str, commit: &str)
    -> Result<PathBuf>;
}
