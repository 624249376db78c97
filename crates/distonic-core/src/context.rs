//! Per-order execution context.

use std::path::PathBuf;

use crate::order::short_sha;
use crate::{Order, OrderId};

/// Runtime values exposed to the template renderer and to every module call.
///
/// Built once per order after the working directory is ready, then shared
/// read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub order_id: OrderId,
    pub repo: String,
    pub workdir: PathBuf,
    pub branch: String,
    /// Branch name with `/` replaced by `-`, safe for paths and tags.
    pub branch_dashed: String,
    pub commit: String,
    pub short_commit: String,
}

impl ExecutionContext {
    pub fn new(
        repo: impl Into<String>,
        workdir: impl Into<PathBuf>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        let branch = branch.into();
        let commit = commit.into();
        Self {
            order_id: OrderId::new(),
            repo: repo.into(),
            workdir: workdir.into(),
            branch_dashed: dash_branch(&branch),
            short_commit: short_sha(&commit).to_string(),
            branch,
            commit,
        }
    }

    pub fn for_order(order: &Order, workdir: impl Into<PathBuf>) -> Self {
        Self {
            order_id: order.id,
            ..Self::new(
                order.repo.name.clone(),
                workdir,
                order.branch.clone(),
                order.commit.clone(),
            )
        }
    }
}

/// Replace path separators in a branch name.
pub fn dash_branch(branch: &str) -> String {
    branch.replace('/', "-")
}
