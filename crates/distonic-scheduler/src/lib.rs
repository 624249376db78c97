//! Order scheduling for distonic.
//!
//! Watchers feed orders into an in-memory FIFO queue. A single dispatch loop
//! hands them to a fixed pool of workers through a bounded channel; each
//! worker prepares a working directory, builds the pipeline and runs it.

pub mod error;
pub mod queue;
pub mod runner;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SchedulerError, WorkerError};
pub use queue::Scheduler;
pub use runner::{PipelineEvent, PipelineResult, PipelineRunner, StageState};
pub use supervisor::Supervisor;
pub use worker::Worker;
