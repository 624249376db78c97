//! Pipeline runner - executes stages strictly in declaration order.

use distonic_config::JobConcurrency;
use distonic_core::pipeline::{Job, Pipeline, Stage};
use distonic_core::{ExecutionContext, ModuleError};
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Final state of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

impl StageState {
    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Succeeded)
    }
}

/// Event emitted during pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StageStarted {
        stage: String,
    },
    JobFinished {
        stage: String,
        job: String,
        error: Option<String>,
    },
    StageFinished {
        stage: String,
        success: bool,
    },
    PipelineFinished {
        success: bool,
    },
}

/// Result of a pipeline execution, one entry per stage in order.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub success: bool,
    pub stages: Vec<(String, StageState)>,
}

impl PipelineResult {
    pub fn state(&self, stage: &str) -> Option<&StageState> {
        self.stages
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, state)| state)
    }

    /// Name of the stage that ended the run, if any.
    pub fn failed_stage(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|(_, state)| matches!(state, StageState::Failed { .. }))
            .map(|(name, _)| name.as_str())
    }
}

/// Runs built pipelines. The first failing stage ends the run; stages after
/// it are recorded as skipped and never called.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunner {
    concurrency: JobConcurrency,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl PipelineRunner {
    pub fn new(concurrency: JobConcurrency) -> Self {
        Self {
            concurrency,
            events: None,
        }
    }

    /// Report progress on `events`. Sending waits for room, so the receiver
    /// must keep up.
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn concurrency(&self) -> JobConcurrency {
        self.concurrency
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    pub async fn run(&self, pipeline: &Pipeline, ctx: &ExecutionContext) -> PipelineResult {
        let mut stages = Vec::with_capacity(pipeline.stages.len());
        let mut failed: Option<String> = None;

        for stage in &pipeline.stages {
            if let Some(failed) = &failed {
                debug!(order = %ctx.order_id, stage = %stage.name, "Skipping stage");
                stages.push((
                    stage.name.clone(),
                    StageState::Skipped {
                        reason: format!("stage '{}' failed", failed),
                    },
                ));
                continue;
            }

            self.emit(PipelineEvent::StageStarted {
                stage: stage.name.clone(),
            })
            .await;
            info!(order = %ctx.order_id, stage = %stage.name, jobs = stage.jobs.len(), "Stage started");

            let state = match self.run_stage(stage, ctx).await {
                Ok(()) => {
                    info!(order = %ctx.order_id, stage = %stage.name, "Stage completed successfully");
                    StageState::Succeeded
                }
                Err(message) => {
                    error!(order = %ctx.order_id, stage = %stage.name, error = %message, "Stage failed");
                    failed = Some(stage.name.clone());
                    StageState::Failed { message }
                }
            };

            self.emit(PipelineEvent::StageFinished {
                stage: stage.name.clone(),
                success: state.is_success(),
            })
            .await;
            stages.push((stage.name.clone(), state));
        }

        let success = failed.is_none();
        self.emit(PipelineEvent::PipelineFinished { success }).await;

        PipelineResult { success, stages }
    }

    /// Run the jobs of one stage, returning the failures joined into one
    /// message.
    async fn run_stage(&self, stage: &Stage, ctx: &ExecutionContext) -> Result<(), String> {
        let mut failures = Vec::new();

        match self.concurrency {
            JobConcurrency::Parallel => {
                let results = join_all(stage.jobs.iter().map(|job| async move {
                    let result = job.module.call(ctx).await;
                    (job, result)
                }))
                .await;

                for (job, result) in results {
                    if let Err(message) = self.finish_job(stage, job, result, ctx).await {
                        failures.push(message);
                    }
                }
            }
            JobConcurrency::Sequential => {
                for job in &stage.jobs {
                    let result = job.module.call(ctx).await;
                    if let Err(message) = self.finish_job(stage, job, result, ctx).await {
                        failures.push(message);
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }

    async fn finish_job(
        &self,
        stage: &Stage,
        job: &Job,
        result: Result<(), ModuleError>,
        ctx: &ExecutionContext,
    ) -> Result<(), String> {
        let error = match &result {
            Ok(()) => {
                debug!(order = %ctx.order_id, stage = %stage.name, job = %job.name, "Job succeeded");
                None
            }
            Err(e) => {
                error!(
                    order = %ctx.order_id,
                    stage = %stage.name,
                    job = %job.name,
                    module = %job.module_name,
                    error = %e,
                    "Job failed"
                );
                Some(format!("job '{}': {}", job.name, e))
            }
        };

        self.emit(PipelineEvent::JobFinished {
            stage: stage.name.clone(),
            job: job.name.clone(),
            error: error.clone(),
        })
        .await;

        match error {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }
}
