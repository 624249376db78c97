//! Run shell commands in the working directory of an order.

use async_trait::async_trait;
use distonic_core::module::parse_params;
use distonic_core::{Bindable, Callable, ExecutionContext, ModuleError, ModuleParams};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Commands {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ShellParams {
    run: Commands,
    #[serde(default)]
    env: BTreeMap<String, String>,
    dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    shell: Option<String>,
}

/// `shell` module: runs each `run` command with `sh -c`, stopping at the
/// first command that fails.
pub struct ShellModule;

impl Bindable for ShellModule {
    fn bind(&self, params: &ModuleParams) -> Result<Arc<dyn Callable>, ModuleError> {
        let params: ShellParams = parse_params(params)?;

        let commands = match params.run {
            Commands::One(cmd) => vec![cmd],
            Commands::Many(cmds) => cmds,
        };
        if commands.is_empty() || commands.iter().any(|c| c.trim().is_empty()) {
            return Err(ModuleError::InvalidParams(
                "`run` must contain at least one non-empty command".to_string(),
            ));
        }

        if let Some(dir) = &params.dir {
            let escapes = dir
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(ModuleError::InvalidParams(format!(
                    "`dir` must be relative to the working directory: {}",
                    dir.display()
                )));
            }
        }

        let timeout = match params.timeout_secs {
            Some(0) => {
                return Err(ModuleError::InvalidParams(
                    "`timeout-secs` must be positive".to_string(),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Arc::new(Shell {
            commands,
            env: params.env,
            dir: params.dir,
            timeout,
            shell: params.shell.unwrap_or_else(|| DEFAULT_SHELL.to_string()),
        }))
    }
}

struct Shell {
    commands: Vec<String>,
    env: BTreeMap<String, String>,
    dir: Option<PathBuf>,
    timeout: Option<Duration>,
    shell: String,
}

impl Shell {
    fn command(&self, script: &str, ctx: &ExecutionContext) -> Command {
        let working_dir = match &self.dir {
            Some(dir) => ctx.workdir.join(dir),
            None => ctx.workdir.clone(),
        };

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(script)
            .current_dir(working_dir)
            .env("CI", "true")
            .env("DISTONIC", "true")
            .env("DISTONIC_REPO", &ctx.repo)
            .env("DISTONIC_WORKDIR", &ctx.workdir)
            .env("DISTONIC_BRANCH", &ctx.branch)
            .env("DISTONIC_BRANCH_DASHED", &ctx.branch_dashed)
            .env("DISTONIC_COMMIT", &ctx.commit)
            .env("DISTONIC_ORDER_ID", ctx.order_id.to_string())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run_one(&self, script: &str, ctx: &ExecutionContext) -> Result<(), ModuleError> {
        info!(order = %ctx.order_id, command = %script, "Running command");

        let mut command = self.command(script, ctx);
        let output = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| ModuleError::Timeout(limit))??,
            None => output.await?,
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(order = %ctx.order_id, stream = "stdout", "{}", line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(order = %ctx.order_id, stream = "stderr", "{}", line);
        }

        if output.status.success() {
            return Ok(());
        }

        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        warn!(order = %ctx.order_id, command = %script, exit_code = %code, "Command failed");

        let last_line = stderr.lines().last().unwrap_or_default();
        Err(ModuleError::Failed(format!(
            "`{}` exited with {}: {}",
            script, code, last_line
        )))
    }
}

#[async_trait]
impl Callable for Shell {
    async fn call(&self, ctx: &ExecutionContext) -> Result<(), ModuleError> {
        for script in &self.commands {
            self.run_one(script, ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ModuleParams {
        value.as_object().cloned().unwrap()
    }

    fn ctx(dir: &std::path::Path) -> ExecutionContext {
        ExecutionContext::new("app", dir, "feature/x", "0123456789abcdef")
    }

    #[test]
    fn test_bind_validation() {
        assert!(ShellModule.bind(&params(json!({ "run": "true" }))).is_ok());
        assert!(
            ShellModule
                .bind(&params(json!({ "run": ["true", "echo ok"], "timeout-secs": 5 })))
                .is_ok()
        );

        let invalid = [
            json!({}),
            json!({ "run": [] }),
            json!({ "run": "  " }),
            json!({ "run": "true", "timeout-secs": 0 }),
            json!({ "run": "true", "dir": "../outside" }),
            json!({ "run": "true", "dir": "/etc" }),
            json!({ "run": "true", "colour": "blue" }),
            json!({ "run": 42 }),
        ];
        for value in invalid {
            assert!(
                matches!(
                    ShellModule.bind(&params(value.clone())),
                    Err(ModuleError::InvalidParams(_))
                ),
                "expected bind failure for {value}"
            );
        }
    }

    #[tokio::test]
    async fn test_runs_in_workdir_with_context_env() {
        let dir = tempfile::tempdir().unwrap();
        let step = ShellModule
            .bind(&params(json!({
                "run": [
                    "echo \"$DISTONIC_BRANCH_DASHED $DISTONIC_COMMIT\" > out.txt",
                    "echo \"$GREETING\" >> out.txt",
                ],
                "env": { "GREETING": "hi" },
            })))
            .unwrap();

        step.call(&ctx(dir.path())).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out, "feature-x 0123456789abcdef\nhi\n");
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let step = ShellModule
            .bind(&params(json!({
                "run": ["echo oops >&2; exit 3", "touch never"],
            })))
            .unwrap();

        let err = step.call(&ctx(dir.path())).await.unwrap_err();
        match err {
            ModuleError::Failed(message) => {
                assert!(message.contains("exited with 3"), "{message}");
                assert!(message.contains("oops"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let step = ShellModule
            .bind(&params(json!({ "run": "touch marker", "dir": "sub" })))
            .unwrap();

        step.call(&ctx(dir.path())).await.unwrap();
        assert!(dir.path().join("sub/marker").exists());
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let step = ShellModule
            .bind(&params(json!({ "run": "sleep 5", "timeout-secs": 1 })))
            .unwrap();

        let err = step.call(&ctx(dir.path())).await.unwrap_err();
        assert!(matches!(err, ModuleError::Timeout(_)));
    }
}
