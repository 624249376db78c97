//! Wires watchers, the scheduler and the worker pool together.

use crate::error::SchedulerError;
use crate::queue::Scheduler;
use crate::runner::PipelineRunner;
use crate::worker::Worker;
use distonic_config::SystemConfig;
use distonic_core::{ModuleRegistry, Order, Watcher};
use distonic_git::{GitWatcher, GitWorkdirs};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Buffer between watchers and the forwarder. The forwarder never blocks, so
/// this only smooths bursts.
const ORDER_BUFFER: usize = 64;

/// Owns every long-running task of the orchestrator.
pub struct Supervisor {
    watchers: Vec<Arc<dyn Watcher>>,
    workers: Vec<Arc<Worker>>,
}

impl Supervisor {
    pub fn new(
        watchers: Vec<Arc<dyn Watcher>>,
        workers: Vec<Arc<Worker>>,
    ) -> Result<Self, SchedulerError> {
        if watchers.is_empty() {
            return Err(SchedulerError::Construction(
                "no repositories to watch".to_string(),
            ));
        }
        if workers.is_empty() {
            return Err(SchedulerError::Construction(
                "the worker pool is empty".to_string(),
            ));
        }
        Ok(Self { watchers, workers })
    }

    /// One git watcher per configured repository and `config.workers` workers
    /// sharing a single set of working directories.
    pub fn from_config(
        config: &SystemConfig,
        registry: Arc<ModuleRegistry>,
    ) -> Result<Self, SchedulerError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            SchedulerError::Construction(format!(
                "cannot use data dir {}: {}",
                config.data_dir.display(),
                e
            ))
        })?;

        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::with_capacity(config.repos.len());
        for repo in &config.repos {
            let watcher = GitWatcher::new(
                repo.name.clone(),
                repo.url.clone(),
                repo.branches.clone(),
                &config.data_dir,
                config.poll_interval,
            )
            .map_err(|e| SchedulerError::Construction(e.to_string()))?;
            watchers.push(Arc::new(watcher));
        }

        let workdirs = Arc::new(GitWorkdirs::in_data_dir(&config.data_dir));
        let runner = PipelineRunner::new(config.jobs);
        let workers = (0..config.workers)
            .map(|id| {
                Arc::new(Worker::new(
                    id,
                    workdirs.clone(),
                    registry.clone(),
                    config.pipeline_file.clone(),
                    runner.clone(),
                ))
            })
            .collect();

        Self::new(watchers, workers)
    }

    /// Run until every watcher and every worker has exited.
    ///
    /// Once the last watcher is gone the queue is closed, the remaining
    /// orders are handed out, and the workers stop when the channel empties.
    pub async fn run(self) -> Result<(), SchedulerError> {
        let scheduler = Arc::new(Scheduler::new());
        let (order_tx, mut order_rx) = mpsc::channel::<Order>(ORDER_BUFFER);
        let (work_tx, work_rx) = mpsc::channel::<Order>(self.workers.len());
        let work_rx = Arc::new(Mutex::new(work_rx));

        info!(
            watchers = self.watchers.len(),
            workers = self.workers.len(),
            "Starting supervisor"
        );

        let mut watcher_tasks = JoinSet::new();
        for watcher in self.watchers {
            let orders = order_tx.clone();
            watcher_tasks.spawn(async move {
                let name = watcher.name().to_string();
                let result = watcher.run(orders).await;
                (name, result)
            });
        }
        // The forwarder sees the channel close once every watcher is done.
        drop(order_tx);

        let forwarder = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                while let Some(order) = order_rx.recv().await {
                    scheduler.schedule(order);
                }
                info!("All watchers finished, closing queue");
                scheduler.close();
            })
        };

        let dispatcher = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.dispatch(work_tx).await })
        };

        let mut worker_tasks = JoinSet::new();
        for worker in self.workers {
            let orders = work_rx.clone();
            worker_tasks.spawn(async move { worker.run(orders).await });
        }
        // Losing every worker must close the channel so dispatch can end.
        drop(work_rx);

        let mut watcher_failures = 0;
        while let Some(joined) = watcher_tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(watcher = %name, "Watcher finished"),
                Ok((name, Err(e))) => {
                    error!(watcher = %name, error = %e, "Watcher failed");
                    watcher_failures += 1;
                }
                Err(e) => {
                    error!(error = %e, "Watcher task panicked");
                    watcher_failures += 1;
                }
            }
        }

        if let Err(e) = forwarder.await {
            error!(error = %e, "Forwarder task panicked");
            scheduler.close();
        }
        if let Err(e) = dispatcher.await {
            error!(error = %e, "Dispatch task panicked");
        }

        let mut worker_failures = 0;
        while let Some(joined) = worker_tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task panicked");
                worker_failures += 1;
            }
        }

        if watcher_failures == 0 && worker_failures == 0 {
            info!("Supervisor finished");
            Ok(())
        } else {
            warn!(watcher_failures, worker_failures, "Supervisor finished with failures");
            Err(SchedulerError::Exited {
                watcher_failures,
                worker_failures,
            })
        }
    }
}
