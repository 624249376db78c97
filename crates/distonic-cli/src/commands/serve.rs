//! Long-running orchestrator.

use anyhow::{Context, Result};
use distonic_config::read_system_config;
use distonic_scheduler::Supervisor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Watch the configured repositories until every watcher stops or Ctrl-C.
pub async fn serve(
    config_path: &Path,
    workers: Option<usize>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = read_system_config(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }

    info!(
        config = %config_path.display(),
        data_dir = %config.data_dir.display(),
        workers = config.workers,
        repos = config.repos.len(),
        jobs = ?config.jobs,
        "Starting distonic"
    );

    let registry = Arc::new(distonic_modules::builtin_registry());
    let supervisor =
        Supervisor::from_config(&config, registry).context("Failed to set up the orchestrator")?;

    tokio::select! {
        result = supervisor.run() => {
            result.context("Orchestrator stopped with failures")?;
            info!("All watchers stopped, shutting down");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
