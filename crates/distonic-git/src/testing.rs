//! Helpers for tests that need real repositories.

use crate::command::git;
use std::path::Path;

/// Whether a usable `git` binary is on the PATH.
pub async fn git_available() -> bool {
    git(None, ["--version"]).await.is_ok()
}

/// Create a repository with a `main` branch and one commit; returns the commit.
pub async fn init_repo(path: &Path) -> String {
    std::fs::create_dir_all(path).unwrap();
    git(Some(path), ["init", "--quiet"]).await.unwrap();
    git(Some(path), ["symbolic-ref", "HEAD", "refs/heads/main"])
        .await
        .unwrap();
    commit_file(path, "README", "first\n").await
}

/// Write `name` and commit it on the current branch; returns the commit.
pub async fn commit_file(repo: &Path, name: &str, content: &str) -> String {
    std::fs::write(repo.join(name), content).unwrap();
    git(Some(repo), ["add", name]).await.unwrap();
    git(
        Some(repo),
        [
            "-c",
            "user.name=distonic",
            "-c",
            "user.email=distonic@example.com",
            "commit",
            "--quiet",
            "-m",
            name,
        ],
    )
    .await
    .unwrap();
    git(Some(repo), ["rev-parse", "HEAD"]).await.unwrap()
}
