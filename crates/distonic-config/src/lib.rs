//! KDL configuration parsing for distonic.
//!
//! This crate handles:
//! - Pipeline definitions (distonic.kdl) in declaration order
//! - Process configuration (watched repositories, worker pool)
//! - `${...}` templating of pipeline definitions

pub mod error;
mod kdl_util;
pub mod pipeline;
pub mod system;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{DEFAULT_PIPELINE_FILE, load_pipeline, parse_pipeline, read_pipeline};
pub use system::{
    JobConcurrency, RepoConfig, SystemConfig, parse_system_config, read_system_config,
};
pub use template::{render, render_file};
