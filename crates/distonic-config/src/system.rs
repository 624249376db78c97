//! Process configuration parsing.

use crate::kdl_util::{
    get_all_string_args, get_first_integer_arg, get_first_string_arg, get_string_prop,
};
use crate::pipeline::DEFAULT_PIPELINE_FILE;
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_WORKERS: usize = 1;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// How the jobs of a single stage are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobConcurrency {
    /// All jobs of a stage run at once.
    #[default]
    Parallel,
    /// Jobs run one after another, stopping at the first failure.
    Sequential,
}

impl FromStr for JobConcurrency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Ok(JobConcurrency::Parallel),
            "sequential" => Ok(JobConcurrency::Sequential),
            other => Err(ConfigError::InvalidValue {
                field: "jobs".to_string(),
                message: format!("expected \"parallel\" or \"sequential\", found \"{}\"", other),
            }),
        }
    }
}

/// System-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Root for mirrors and working directories.
    pub data_dir: PathBuf,
    /// Size of the worker pool.
    pub workers: usize,
    /// How often watchers poll their remotes.
    pub poll_interval: Duration,
    /// Pipeline definition file name inside each repository.
    pub pipeline_file: String,
    /// Execution policy for jobs within a stage.
    pub jobs: JobConcurrency,
    /// Watched repositories.
    pub repos: Vec<RepoConfig>,
}

/// A watched repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub name: String,
    pub url: String,
    pub branches: Vec<String>,
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut data_dir = None;
    let mut workers = DEFAULT_WORKERS;
    let mut poll_interval = Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS);
    let mut pipeline_file = DEFAULT_PIPELINE_FILE.to_string();
    let mut jobs = JobConcurrency::default();
    let mut repos: Vec<RepoConfig> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "data-dir" => {
                data_dir = Some(PathBuf::from(required_string(node, "data-dir")?));
            }
            "workers" => {
                workers = positive_integer(node, "workers")? as usize;
            }
            "poll-interval" => {
                poll_interval = Duration::from_secs(positive_integer(node, "poll-interval")?);
            }
            "pipeline-file" => {
                pipeline_file = required_string(node, "pipeline-file")?;
            }
            "jobs" => {
                jobs = required_string(node, "jobs")?.parse()?;
            }
            "repo" => {
                let repo = parse_repo(node)?;
                if repos.iter().any(|r| r.name == repo.name) {
                    return Err(ConfigError::Duplicate(format!("repo '{}'", repo.name)));
                }
                repos.push(repo);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let data_dir = data_dir.ok_or_else(|| ConfigError::MissingField("data-dir".to_string()))?;
    if repos.is_empty() {
        return Err(ConfigError::MissingField("repo".to_string()));
    }

    Ok(SystemConfig {
        data_dir,
        workers,
        poll_interval,
        pipeline_file,
        jobs,
        repos,
    })
}

/// Read and parse a system configuration file.
pub fn read_system_config(path: &Path) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

fn parse_repo(node: &KdlNode) -> ConfigResult<RepoConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("repo name".to_string()))?;

    let url = get_string_prop(node, "url")
        .ok_or_else(|| ConfigError::MissingField(format!("url for repo '{}'", name)))?;

    let mut branches = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if matches!(child.name().value(), "branches" | "branch") {
                branches.extend(get_all_string_args(child));
            }
        }
    }

    if branches.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "branches for repo '{}'",
            name
        )));
    }

    Ok(RepoConfig {
        name,
        url,
        branches,
    })
}

fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::InvalidValue {
        field: field.to_string(),
        message: "expected a string".to_string(),
    })
}

fn positive_integer(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    get_first_integer_arg(node)
        .filter(|n| *n > 0)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a positive integer".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            data-dir "/var/lib/distonic"
            workers 4
            poll-interval 15
            pipeline-file "ci.kdl"
            jobs "sequential"

            repo "app" url="https://example.com/app.git" {
                branches "main" "release/1.0"
            }

            repo "docs" url="/srv/git/docs.git" {
                branch "main"
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/distonic"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.pipeline_file, "ci.kdl");
        assert_eq!(config.jobs, JobConcurrency::Sequential);
        assert_eq!(config.repos.len(), 2);
        assert_eq!(config.repos[0].branches, vec!["main", "release/1.0"]);
        assert_eq!(config.repos[1].url, "/srv/git/docs.git");
    }

    #[test]
    fn test_defaults() {
        let kdl = r#"
            data-dir "/tmp/distonic"
            repo "app" url="/srv/app.git" {
                branches "main"
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.pipeline_file, DEFAULT_PIPELINE_FILE);
        assert_eq!(config.jobs, JobConcurrency::Parallel);
    }

    #[test]
    fn test_missing_fields() {
        let no_data_dir = r#"
            repo "app" url="/srv/app.git" {
                branches "main"
            }
        "#;
        assert!(matches!(
            parse_system_config(no_data_dir).unwrap_err(),
            ConfigError::MissingField(_)
        ));

        let no_repos = r#"data-dir "/tmp""#;
        assert!(matches!(
            parse_system_config(no_repos).unwrap_err(),
            ConfigError::MissingField(_)
        ));

        let no_branches = r#"
            data-dir "/tmp"
            repo "app" url="/srv/app.git"
        "#;
        assert!(matches!(
            parse_system_config(no_branches).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_invalid_values() {
        let zero_workers = r#"
            data-dir "/tmp"
            workers 0
            repo "app" url="/srv/app.git" {
                branches "main"
            }
        "#;
        assert!(matches!(
            parse_system_config(zero_workers).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));

        let bad_jobs = r#"
            data-dir "/tmp"
            jobs "sometimes"
            repo "app" url="/srv/app.git" {
                branches "main"
            }
        "#;
        assert!(matches!(
            parse_system_config(bad_jobs).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_duplicate_repo() {
        let kdl = r#"
            data-dir "/tmp"
            repo "app" url="/srv/a.git" {
                branches "main"
            }
            repo "app" url="/srv/b.git" {
                branches "main"
            }
        "#;
        assert!(matches!(
            parse_system_config(kdl).unwrap_err(),
            ConfigError::Duplicate(_)
        ));
    }
}
