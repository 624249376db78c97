//! Error types for scheduling and order processing.

use distonic_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid setup: {0}")]
    Construction(String),

    #[error("{watcher_failures} watcher(s) and {worker_failures} worker(s) failed")]
    Exited {
        watcher_failures: usize,
        worker_failures: usize,
    },
}

/// Reasons an order is abandoned.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Cannot prepare working directory: {0}")]
    Workdir(#[source] distonic_core::Error),

    #[error("Cannot load pipeline: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot build pipeline: {0}")]
    Build(#[source] distonic_core::Error),

    #[error("Order processing panicked: {0}")]
    Panicked(String),

    #[error("Pipeline failed at stage '{stage}'")]
    PipelineFailed { stage: String },
}
