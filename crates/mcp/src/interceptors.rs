//! Ready-made interceptors.

use std::time::Instant;

use async_trait::async_trait;
use log::{info, warn};

use crate::chain::{Interceptor, Next};
use crate::context::ExecutionContext;
use crate::handler::HandlerResult;

/// Logs every invocation it wraps together with its outcome and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next<'_>) -> HandlerResult {
        let rid = ctx.request().id_label().unwrap_or_default();
        let started = Instant::now();

        let result = next.run(ctx).await;

        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(_) => info!(request_id = rid.as_str(); "{} completed in {elapsed_ms}ms", ctx.key()),
            Err(err) => warn!(
                request_id = rid.as_str();
                "{} failed after {elapsed_ms}ms: {err}",
                ctx.key()
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::*;
    use crate::chain;
    use crate::error::HandlerError;
    use crate::handler::{handler_fn, HandlerInput};
    use crate::protocol::JsonRpcRequest;
    use crate::registry::{Registry, Tool};

    async fn invoke(result: Result<Value, &'static str>) -> HandlerResult {
        let mut registry = Registry::new();
        let descriptor = registry
            .register_tool(
                Tool::new(
                    "op",
                    handler_fn(move |_| result.clone().map_err(HandlerError::msg)),
                )
                .interceptor(LoggingInterceptor),
            )
            .unwrap();
        let request = Arc::new(JsonRpcRequest::new("req-1", "tools/call", json!({"name": "op"})));
        let ctx = ExecutionContext::new(request, Arc::clone(&descriptor), HandlerInput::default());
        chain::run(&descriptor, &ctx).await
    }

    #[tokio::test]
    async fn passes_success_through() {
        assert_eq!(invoke(Ok(json!(3))).await.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn passes_failure_through_unchanged() {
        let err = invoke(Err("boom")).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(err.as_protocol().is_none());
    }
}
