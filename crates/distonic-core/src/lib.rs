//! Core domain types and traits for the distonic build orchestrator.
//!
//! This crate contains:
//! - Orders and the repository handles they point at
//! - The per-order execution context
//! - The two-phase module traits and the module registry
//! - Pipeline documents and the pipeline builder
//! - Watcher and working-directory traits implemented by collaborators

pub mod context;
pub mod error;
pub mod id;
pub mod module;
pub mod order;
pub mod pipeline;
pub mod watcher;
pub mod workdir;

pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use id::OrderId;
pub use module::{Bindable, Callable, ModuleError, ModuleParams, ModuleRegistry};
pub use order::{Order, RepoHandle};
pub use pipeline::{Job, Pipeline, PipelineDocument, Stage};
pub use watcher::Watcher;
pub use workdir::WorkdirProvider;
