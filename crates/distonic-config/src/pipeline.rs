//! Pipeline definition parsing.

use crate::kdl_util::{get_first_string_arg, node_to_object};
use crate::template::render_file;
use crate::{ConfigError, ConfigResult};
use distonic_core::ExecutionContext;
use distonic_core::pipeline::{JobEntry, JobSpec, NAME_KEY, PipelineDocument, StageSpec};
use kdl::{KdlDocument, KdlNode};
use std::path::Path;
use tracing::debug;

/// File name of the pipeline definition inside a repository.
pub const DEFAULT_PIPELINE_FILE: &str = "distonic.kdl";

/// Parse a pipeline definition from KDL text.
///
/// Stages and jobs keep the order in which they are declared.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineDocument> {
    let doc: KdlDocument = kdl.parse()?;
    let mut stages: Vec<StageSpec> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "stage" => {
                let stage = parse_stage(node)?;
                if stages.iter().any(|s| s.name == stage.name) {
                    return Err(ConfigError::Duplicate(format!("stage '{}'", stage.name)));
                }
                stages.push(stage);
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "pipeline".to_string(),
                    message: format!("expected `stage` node, found `{}`", other),
                });
            }
        }
    }

    Ok(PipelineDocument { stages })
}

/// Read and parse `file_name` from `dir`.
pub fn read_pipeline(dir: &Path, file_name: &str) -> ConfigResult<PipelineDocument> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return Err(ConfigError::NotFound(path));
    }

    let content = std::fs::read_to_string(&path)?;
    let doc = parse_pipeline(&content)?;
    debug!(path = %path.display(), stages = doc.stages.len(), "Read pipeline definition");
    Ok(doc)
}

/// Render the pipeline file of a checkout with `ctx`, write it back, then
/// parse it.
pub fn load_pipeline(ctx: &ExecutionContext, file_name: &str) -> ConfigResult<PipelineDocument> {
    let path = ctx.workdir.join(file_name);
    if !path.is_file() {
        return Err(ConfigError::NotFound(path));
    }

    render_file(&path, ctx)?;
    read_pipeline(&ctx.workdir, file_name)
}

fn parse_stage(node: &KdlNode) -> ConfigResult<StageSpec> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("stage name".to_string()))?;

    let mut jobs = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "job" => jobs.push(parse_job(child)),
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("stage '{}'", name),
                        message: format!("expected `job` node, found `{}`", other),
                    });
                }
            }
        }
    }

    Ok(StageSpec { name, jobs })
}

fn parse_job(node: &KdlNode) -> JobSpec {
    let mut entries = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            if key == NAME_KEY {
                if let Some(name) = get_first_string_arg(child) {
                    entries.push(JobEntry::Name(name));
                }
                continue;
            }

            entries.push(JobEntry::Module {
                module: key.to_string(),
                params: node_to_object(child, true),
            });
        }
    }

    JobSpec { entries }
}
