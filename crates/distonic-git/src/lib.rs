//! Git integration for distonic.
//!
//! Everything shells out to the `git` binary:
//! - [`GitWatcher`] keeps a bare mirror of a remote and emits orders when
//!   branch heads move
//! - [`GitWorkdirs`] materializes one checkout per (repository, branch, commit)

pub mod command;
pub mod watcher;
pub mod workdir;

pub use command::GitError;
pub use watcher::GitWatcher;
pub use workdir::GitWorkdirs;

#[cfg(test)]
pub(crate) mod testing;
