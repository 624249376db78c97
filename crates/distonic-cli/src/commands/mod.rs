//! CLI command implementations.

pub mod run;
pub mod serve;

use anyhow::{Context, Result};
use distonic_config::parse_pipeline;
use distonic_core::pipeline::JobEntry;
use distonic_core::{ModuleRegistry, Pipeline};
use std::path::Path;

/// Outcome of checking a pipeline definition.
#[derive(Debug)]
pub struct Report {
    pub stages: usize,
    pub jobs: usize,
    /// Modules that are not registered; their jobs would be dropped.
    pub unknown_modules: Vec<String>,
}

/// Parse `content` and bind every job against `registry`.
pub fn check_pipeline(content: &str, registry: &ModuleRegistry) -> Result<Report> {
    let doc = parse_pipeline(content).context("Failed to parse pipeline definition")?;

    let mut unknown_modules: Vec<String> = Vec::new();
    for entry in doc.stages.iter().flat_map(|s| &s.jobs).flat_map(|j| &j.entries) {
        if let JobEntry::Module { module, .. } = entry {
            if registry.lookup(module).is_none() && !unknown_modules.contains(module) {
                unknown_modules.push(module.clone());
            }
        }
    }

    let pipeline = Pipeline::build(&doc, registry)?;
    Ok(Report {
        stages: pipeline.stages.len(),
        jobs: pipeline.job_count(),
        unknown_modules,
    })
}

pub fn validate(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let report = check_pipeline(&content, &distonic_modules::builtin_registry())
        .with_context(|| format!("{} is not valid", path.display()))?;

    for module in &report.unknown_modules {
        println!("warning: unknown module `{}`, its jobs will be skipped", module);
    }
    println!(
        "Configuration is valid ({} stages, {} jobs)",
        report.stages, report.jobs
    );
    Ok(())
}
