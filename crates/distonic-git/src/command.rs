//! Running git commands.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Git operation errors.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`git {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Clone failed: {0}")]
    CloneFailed(String),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),
}

impl From<GitError> for distonic_core::Error {
    fn from(err: GitError) -> Self {
        distonic_core::Error::Workdir(err.to_string())
    }
}

/// Run git with `args`, optionally inside `cwd`, and return trimmed stdout.
pub async fn git<I, S>(cwd: Option<&Path>, args: I) -> Result<String, GitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let rendered = args
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    let mut command = Command::new("git");
    command
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    debug!(command = %rendered, "Running git");
    let output = command.output().await?;

    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command: rendered,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether `path` is the top of a git work tree.
pub async fn is_work_tree(path: &Path) -> bool {
    if !path.join(".git").exists() {
        return false;
    }
    git(Some(path), ["rev-parse", "--is-inside-work-tree"])
        .await
        .map(|out| out == "true")
        .unwrap_or(false)
}

/// Resolve a branch of the repository at `repo` to a commit id.
pub async fn resolve_branch(repo: &Path, branch: &str) -> Result<String, GitError> {
    let refname = format!("refs/heads/{}^{{commit}}", branch);
    git(Some(repo), ["rev-parse", "--verify", "--quiet", refname.as_str()])
        .await
        .map_err(|_| GitError::UnknownBranch(branch.to_string()))
}
