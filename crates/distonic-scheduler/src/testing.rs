//! Fixtures shared by the scheduler tests.

use async_trait::async_trait;
use distonic_core::pipeline::{Job, Stage};
use distonic_core::{
    Bindable, Callable, Error, ExecutionContext, ModuleError, ModuleParams, ModuleRegistry, Order,
    RepoHandle, Result, Watcher, WorkdirProvider,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A deterministic order; `i` becomes the commit id.
pub fn order(branch: &str, i: usize) -> Order {
    let repo = Arc::new(RepoHandle::new("app", "/srv/app.git"));
    Order::new(repo, branch, format!("{:040x}", i))
}

/// Log of `(job, commit)` pairs written by [`Record`].
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(String, String)>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn jobs(&self) -> Vec<String> {
        self.calls().into_iter().map(|(job, _)| job).collect()
    }
}

/// Module that records each call. Takes an optional `label` parameter.
pub struct Record(pub CallLog);

impl Bindable for Record {
    fn bind(&self, params: &ModuleParams) -> std::result::Result<Arc<dyn Callable>, ModuleError> {
        let label = params
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or("record")
            .to_string();
        Ok(Arc::new(Recording {
            label,
            log: self.0.clone(),
        }))
    }
}

struct Recording {
    label: String,
    log: CallLog,
}

#[async_trait]
impl Callable for Recording {
    async fn call(&self, ctx: &ExecutionContext) -> std::result::Result<(), ModuleError> {
        self.log
            .0
            .lock()
            .unwrap()
            .push((self.label.clone(), ctx.commit.clone()));
        Ok(())
    }
}

/// Module whose calls always fail.
pub struct Fail;

impl Bindable for Fail {
    fn bind(&self, _params: &ModuleParams) -> std::result::Result<Arc<dyn Callable>, ModuleError> {
        Ok(Arc::new(Fail))
    }
}

#[async_trait]
impl Callable for Fail {
    async fn call(&self, _ctx: &ExecutionContext) -> std::result::Result<(), ModuleError> {
        Err(ModuleError::Failed("boom".to_string()))
    }
}

/// Module whose calls panic.
pub struct Panic;

impl Bindable for Panic {
    fn bind(&self, _params: &ModuleParams) -> std::result::Result<Arc<dyn Callable>, ModuleError> {
        Ok(Arc::new(Panic))
    }
}

#[async_trait]
impl Callable for Panic {
    async fn call(&self, ctx: &ExecutionContext) -> std::result::Result<(), ModuleError> {
        panic!("module blew up on {}", ctx.commit);
    }
}

pub fn registry(log: &CallLog) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry
        .register("record", Arc::new(Record(log.clone())))
        .register("fail", Arc::new(Fail))
        .register("panic", Arc::new(Panic));
    registry
}

pub fn recording_job(log: &CallLog, label: &str) -> Job {
    Job {
        name: label.to_string(),
        module_name: "record".to_string(),
        module: Arc::new(Recording {
            label: label.to_string(),
            log: log.clone(),
        }),
    }
}

pub fn failing_job(name: &str) -> Job {
    Job {
        name: name.to_string(),
        module_name: "fail".to_string(),
        module: Arc::new(Fail),
    }
}

pub fn stage(name: &str, jobs: Vec<Job>) -> Stage {
    Stage {
        name: name.to_string(),
        jobs,
    }
}

/// Working directories that are plain directories holding a fixed pipeline
/// definition.
pub struct StaticWorkdirs {
    pub root: PathBuf,
    pub pipeline: Option<String>,
}

#[async_trait]
impl WorkdirProvider for StaticWorkdirs {
    async fn ensure_workdir(
        &self,
        repo: &RepoHandle,
        branch: &str,
        commit: &str,
    ) -> Result<PathBuf> {
        if commit == "unreachable" {
            return Err(Error::Workdir(format!("{}@{} has no {}", repo.name, branch, commit)));
        }
        let path = self.root.join(&repo.name).join(commit);
        tokio::fs::create_dir_all(&path).await?;
        if let Some(pipeline) = &self.pipeline {
            tokio::fs::write(path.join("distonic.kdl"), pipeline).await?;
        }
        Ok(path)
    }
}

/// Watcher that emits a fixed list of orders, then fails if `fail` is set.
pub struct ScriptedWatcher {
    pub name: String,
    pub orders: Vec<Order>,
    pub fail: bool,
}

#[async_trait]
impl Watcher for ScriptedWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, orders: mpsc::Sender<Order>) -> Result<()> {
        for order in &self.orders {
            if orders.send(order.clone()).await.is_err() {
                return Ok(());
            }
        }
        if self.fail {
            return Err(Error::Watcher(format!("{} lost its remote", self.name)));
        }
        Ok(())
    }
}
