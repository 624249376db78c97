//! Log a message from a pipeline.

use async_trait::async_trait;
use distonic_core::module::parse_params;
use distonic_core::{Bindable, Callable, ExecutionContext, ModuleError, ModuleParams};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EchoParams {
    #[serde(default)]
    args: Vec<String>,
    message: Option<String>,
}

pub struct EchoModule;

impl Bindable for EchoModule {
    fn bind(&self, params: &ModuleParams) -> Result<Arc<dyn Callable>, ModuleError> {
        let params: EchoParams = parse_params(params)?;
        let message = match params.message {
            Some(message) => message,
            None if !params.args.is_empty() => params.args.join(" "),
            None => {
                return Err(ModuleError::InvalidParams(
                    "echo needs a message".to_string(),
                ));
            }
        };
        Ok(Arc::new(Echo { message }))
    }
}

struct Echo {
    message: String,
}

#[async_trait]
impl Callable for Echo {
    async fn call(&self, ctx: &ExecutionContext) -> Result<(), ModuleError> {
        info!(order = %ctx.order_id, repo = %ctx.repo, branch = %ctx.branch, "{}", self.message);
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

    #[tokio::test]
    async fn test_echo_args() {
        let step = EchoModule
            .bind(&params(json!({ "args": ["hello", "world"] })))
            .unwrap();
        let ctx = ExecutionContext::new("app", "/tmp", "main", "abc");
        assert!(step.call(&ctx).await.is_ok());
    }

    #[test]
    fn test_echo_requires_message() {
        assert!(matches!(
            EchoModule.bind(&ModuleParams::new()),
            Err(ModuleError::InvalidParams(_))
        ));
        assert!(matches!(
            EchoModule.bind(&params(json!({ "volume": 11 }))),
            Err(ModuleError::InvalidParams(_))
        ));
    }
}
