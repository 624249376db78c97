//! Error types for distonic.

use thiserror::Error;

use crate::module::ModuleError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("module `{module}` in job `{job}` of stage `{stage}` failed to bind: {source}")]
    Bind {
        stage: String,
        job: String,
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("working directory error: {0}")]
    Workdir(String),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
