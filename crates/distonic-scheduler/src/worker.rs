//! Worker that takes orders off the dispatch channel and builds them.

use crate::error::WorkerError;
use crate::runner::{PipelineResult, PipelineRunner};
use distonic_config::load_pipeline;
use distonic_core::{ExecutionContext, ModuleRegistry, Order, Pipeline, WorkdirProvider};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info};

/// Receiving end of the dispatch channel, shared by every worker.
pub type OrderReceiver = Arc<Mutex<mpsc::Receiver<Order>>>;

/// A worker processes one order at a time:
/// prepare the working directory, render and build the pipeline, run it.
pub struct Worker {
    id: usize,
    workdirs: Arc<dyn WorkdirProvider>,
    registry: Arc<ModuleRegistry>,
    pipeline_file: String,
    runner: PipelineRunner,
}

impl Worker {
    pub fn new(
        id: usize,
        workdirs: Arc<dyn WorkdirProvider>,
        registry: Arc<ModuleRegistry>,
        pipeline_file: impl Into<String>,
        runner: PipelineRunner,
    ) -> Self {
        Self {
            id,
            workdirs,
            registry,
            pipeline_file: pipeline_file.into(),
            runner,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Process orders until the channel is closed.
    ///
    /// A failed order is logged and dropped; the worker moves on.
    pub async fn run(&self, orders: OrderReceiver) {
        info!(worker = self.id, "Starting worker");

        loop {
            let next = orders.lock().await.recv().await;
            let Some(order) = next else {
                break;
            };

            info!(worker = self.id, order = %order, order_id = %order.id, "Order received");
            match self.process_isolated(&order).await {
                Ok(_) => {
                    info!(worker = self.id, order = %order, "Order completed");
                }
                Err(e) => {
                    error!(worker = self.id, order = %order, order_id = %order.id, error = %e, "Order failed");
                }
            }
        }

        info!(worker = self.id, "Order channel closed, worker stopping");
    }

    /// [`process_order`](Self::process_order), with a panic in any step
    /// turned into an order failure.
    async fn process_isolated(&self, order: &Order) -> Result<PipelineResult, WorkerError> {
        AssertUnwindSafe(self.process_order(order))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(WorkerError::Panicked(panic_message(panic.as_ref()))))
    }

    pub async fn process_order(&self, order: &Order) -> Result<PipelineResult, WorkerError> {
        let workdir = self
            .workdirs
            .ensure_workdir(&order.repo, &order.branch, &order.commit)
            .await
            .map_err(WorkerError::Workdir)?;
        debug!(worker = self.id, order = %order, workdir = %workdir.display(), "Working dir ready");

        let ctx = ExecutionContext::for_order(order, workdir);

        let doc = {
            let ctx = ctx.clone();
            let file = self.pipeline_file.clone();
            tokio::task::spawn_blocking(move || load_pipeline(&ctx, &file))
                .await
                .map_err(|e| WorkerError::Panicked(e.to_string()))??
        };
        let pipeline = Pipeline::build(&doc, &self.registry).map_err(WorkerError::Build)?;
        debug!(
            worker = self.id,
            order = %order,
            stages = ?pipeline.stage_names(),
            jobs = pipeline.job_count(),
            "Pipeline built"
        );

        let result = self.runner.run(&pipeline, &ctx).await;
        if let Some(stage) = result.failed_stage() {
            return Err(WorkerError::PipelineFailed {
                stage: stage.to_string(),
            });
        }

        Ok(result)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
