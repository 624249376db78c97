//! Two-phase build-step modules.
//!
//! A module is first bound with the parameters declared in the pipeline
//! definition, which validates them once and yields a callable step. The
//! callable is then invoked with the execution context of an order.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ExecutionContext;

/// Free-form parameters of a module, as declared in configuration.
pub type ModuleParams = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("step failed: {0}")]
    Failed(String),

    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deserialize module parameters into a typed structure.
pub fn parse_params<T: DeserializeOwned>(params: &ModuleParams) -> Result<T, ModuleError> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| ModuleError::InvalidParams(e.to_string()))
}

/// Construct-from-config role of a module.
pub trait Bindable: Send + Sync {
    /// Validate `params` and produce a ready-to-run step.
    fn bind(&self, params: &ModuleParams) -> Result<Arc<dyn Callable>, ModuleError>;
}

/// Execute-with-context role of a module.
#[async_trait]
pub trait Callable: Send + Sync {
    async fn call(&self, ctx: &ExecutionContext) -> Result<(), ModuleError>;
}

/// Maps module names to their bindable implementations.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn Bindable>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, replacing any previous module of the same name.
    pub fn register(&mut self, name: impl Into<String>, module: Arc<dyn Bindable>) -> &mut Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Bindable>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Noop;

    #[async_trait]
    impl Callable for Noop {
        async fn call(&self, _ctx: &ExecutionContext) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    struct NoopModule;

    impl Bindable for NoopModule {
        fn bind(&self, _params: &ModuleParams) -> Result<Arc<dyn Callable>, ModuleError> {
            Ok(Arc::new(Noop))
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ModuleRegistry::new();
        registry.register("noop", Arc::new(NoopModule));

        assert!(registry.lookup("noop").is_some());
        assert!(registry.lookup("missing").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["noop"]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_bound_module_is_callable() {
        let mut registry = ModuleRegistry::new();
        registry.register("noop", Arc::new(NoopModule));

        let module = registry.lookup("noop").unwrap();
        let step = module.bind(&ModuleParams::new()).unwrap();
        let ctx = ExecutionContext::new("app", "/tmp", "main", "abc");
        assert!(step.call(&ctx).await.is_ok());
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Params {
        count: u32,
    }

    #[test]
    fn test_parse_params() {
        let mut params = ModuleParams::new();
        params.insert("count".into(), 3.into());
        let parsed: Params = parse_params(&params).unwrap();
        assert_eq!(parsed.count, 3);

        params.insert("extra".into(), true.into());
        let err = parse_params::<Params>(&params).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidParams(_)));
    }
}
