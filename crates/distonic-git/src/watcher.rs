//! Branch watcher backed by a bare mirror of the remote.

use crate::command::{GitError, git, resolve_branch};
use async_trait::async_trait;
use distonic_core::{Error, Order, RepoHandle, Result, Watcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Polls a remote and emits an order each time a tracked branch head moves.
///
/// The first observation of each branch after startup counts as a move, so
/// current heads get built when the orchestrator starts.
pub struct GitWatcher {
    repo: Arc<RepoHandle>,
    branches: Vec<String>,
    poll_interval: Duration,
}

impl GitWatcher {
    /// Create a watcher keeping its mirror at `<data_dir>/mirrors/<name>`.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        branches: Vec<String>,
        data_dir: &Path,
        poll_interval: Duration,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::InvalidInput(format!(
                "invalid repository name: {:?}",
                name
            )));
        }
        if branches.is_empty() {
            return Err(Error::InvalidInput(format!(
                "repository '{}' watches no branches",
                name
            )));
        }

        let mirror = data_dir.join("mirrors").join(&name);
        Ok(Self {
            repo: Arc::new(RepoHandle::new(name, url).with_mirror(mirror)),
            branches,
            poll_interval,
        })
    }

    pub fn repo(&self) -> &Arc<RepoHandle> {
        &self.repo
    }

    fn mirror(&self) -> Result<&Path> {
        self.repo
            .mirror
            .as_deref()
            .ok_or_else(|| Error::Internal("watcher has no mirror".to_string()))
    }

    /// Clone the mirror if it does not exist yet.
    async fn ensure_mirror(&self) -> std::result::Result<(), GitError> {
        let Some(mirror) = self.repo.mirror.as_deref() else {
            return Ok(());
        };
        if mirror.join("HEAD").is_file() {
            debug!(repo = %self.repo.name, mirror = %mirror.display(), "Using existing mirror");
            return Ok(());
        }

        if let Some(parent) = mirror.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(repo = %self.repo.name, url = %self.repo.url, "Cloning mirror");
        let target = mirror.to_string_lossy().to_string();
        git(
            None,
            ["clone", "--quiet", "--mirror", self.repo.url.as_str(), target.as_str()],
        )
        .await
        .map_err(|e| GitError::CloneFailed(e.to_string()))?;
        Ok(())
    }

    /// Fetch the remote and return orders for every branch whose head
    /// differs from `heads`, updating `heads`.
    async fn poll(&self, heads: &mut HashMap<String, String>) -> Result<Vec<Order>> {
        let mirror = self.mirror()?;
        git(Some(mirror), ["fetch", "--quiet", "--prune", "--force", "origin"])
            .await
            .map_err(|e| Error::Watcher(e.to_string()))?;

        let mut orders = Vec::new();
        for branch in &self.branches {
            let commit = match resolve_branch(mirror, branch).await {
                Ok(commit) => commit,
                Err(e) => {
                    warn!(repo = %self.repo.name, branch = %branch, error = %e, "Cannot resolve branch");
                    continue;
                }
            };

            if heads.get(branch) == Some(&commit) {
                continue;
            }

            debug!(
                repo = %self.repo.name,
                branch = %branch,
                previous = ?heads.get(branch),
                commit = %commit,
                "Branch moved"
            );
            heads.insert(branch.clone(), commit.clone());
            orders.push(Order::new(self.repo.clone(), branch.clone(), commit));
        }

        Ok(orders)
    }
}

#[async_trait]
impl Watcher for GitWatcher {
    fn name(&self) -> &str {
        &self.repo.name
    }

    async fn run(&self, orders: mpsc::Sender<Order>) -> Result<()> {
        self.ensure_mirror().await.map_err(|e| {
            Error::Watcher(format!("cannot mirror '{}': {}", self.repo.name, e))
        })?;

        let mut heads = HashMap::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(repo = %self.repo.name, branches = ?self.branches, "Watching repository");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = orders.closed() => {
                    debug!(repo = %self.repo.name, "Order channel closed, stopping watcher");
                    return Ok(());
                }
            }

            let new_orders = match self.poll(&mut heads).await {
                Ok(new_orders) => new_orders,
                Err(e) => {
                    warn!(repo = %self.repo.name, error = %e, "Poll failed, retrying on next tick");
                    continue;
                }
            };

            for order in new_orders {
                info!(order = %order, order_id = %order.id, "New commit");
                if orders.send(order).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
