//! Pipeline documents and bound pipelines.
//!
//! A [`PipelineDocument`] is the parsed, still-unbound pipeline definition:
//! stages in declaration order, each with its job specifications. Building it
//! against a [`ModuleRegistry`] produces a [`Pipeline`] whose jobs each hold a
//! ready-to-call module.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::module::{Callable, ModuleParams, ModuleRegistry};
use crate::{Error, Result};

/// Reserved job entry key that sets the job's display name.
pub const NAME_KEY: &str = "name";

/// A parsed pipeline definition. Stage order is declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineDocument {
    pub stages: Vec<StageSpec>,
}

/// A stage as declared in the pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub name: String,
    pub jobs: Vec<JobSpec>,
}

/// A job as declared: an ordered list of entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSpec {
    pub entries: Vec<JobEntry>,
}

/// One entry of a job specification.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEntry {
    /// The reserved `name` key.
    Name(String),
    /// A module name and its parameters.
    Module { module: String, params: ModuleParams },
}

impl JobSpec {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.entries.push(JobEntry::Name(name.into()));
        self
    }

    pub fn module(mut self, module: impl Into<String>, params: ModuleParams) -> Self {
        self.entries.push(JobEntry::Module {
            module: module.into(),
            params,
        });
        self
    }

    /// The declared name, if any.
    pub fn name(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match e {
            JobEntry::Name(n) => Some(n.as_str()),
            JobEntry::Module { .. } => None,
        })
    }
}

/// A pipeline ready to run: stages in order, every job bound.
#[derive(Clone, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

/// A sequential phase of a pipeline.
#[derive(Clone)]
pub struct Stage {
    pub name: String,
    pub jobs: Vec<Job>,
}

/// A named unit bound to exactly one callable module.
#[derive(Clone)]
pub struct Job {
    pub name: String,
    /// Name of the module the job was bound from.
    pub module_name: String,
    pub module: Arc<dyn Callable>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stages).finish()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("module", &self.module_name)
            .finish()
    }
}

impl Pipeline {
    /// Bind every job of `doc` against `registry`.
    ///
    /// A job naming an unregistered module is dropped with a warning. A
    /// registered module that rejects its parameters aborts the whole build.
    pub fn build(doc: &PipelineDocument, registry: &ModuleRegistry) -> Result<Pipeline> {
        let mut stages = Vec::with_capacity(doc.stages.len());

        for stage_spec in &doc.stages {
            let mut jobs = Vec::with_capacity(stage_spec.jobs.len());

            'jobs: for (idx, job_spec) in stage_spec.jobs.iter().enumerate() {
                let job_label = job_spec
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{}", idx + 1));

                let mut name = None;
                let mut bound: Option<(String, Arc<dyn Callable>)> = None;

                for entry in &job_spec.entries {
                    match entry {
                        JobEntry::Name(n) => name = Some(n.clone()),
                        JobEntry::Module { module, params } => {
                            let Some(bindable) = registry.lookup(module) else {
                                warn!(
                                    stage = %stage_spec.name,
                                    job = %job_label,
                                    module = %module,
                                    "Unknown module, skipping job"
                                );
                                continue 'jobs;
                            };

                            let callable = bindable.bind(params).map_err(|source| {
                                error!(
                                    stage = %stage_spec.name,
                                    job = %job_label,
                                    module = %module,
                                    error = %source,
                                    "Could not initialize module"
                                );
                                Error::Bind {
                                    stage: stage_spec.name.clone(),
                                    job: job_label.clone(),
                                    module: module.clone(),
                                    source,
                                }
                            })?;

                            if let Some((previous, _)) = &bound {
                                warn!(
                                    stage = %stage_spec.name,
                                    job = %job_label,
                                    replaced = %previous,
                                    module = %module,
                                    "Job declares more than one module, keeping the last"
                                );
                            }
                            bound = Some((module.clone(), callable));
                        }
                    }
                }

                let Some((module_name, module)) = bound else {
                    warn!(stage = %stage_spec.name, job = %job_label, "Job has no module, skipping");
                    continue;
                };

                jobs.push(Job {
                    name: name.unwrap_or_else(|| module_name.clone()),
                    module_name,
                    module,
                });
            }

            debug!(stage = %stage_spec.name, jobs = jobs.len(), "Stage built");
            stages.push(Stage {
                name: stage_spec.name.clone(),
                jobs,
            });
        }

        Ok(Pipeline { stages })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }
}
