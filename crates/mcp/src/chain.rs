//! Guard and interceptor composition around a handler invocation.
//!
//! Guards run first, strictly in declaration order, and the first one that
//! rejects (returns `false` or fails) ends the invocation: no later guard,
//! no interceptor and no handler runs. Interceptors then wrap the handler
//! onion-style, the first declared being outermost.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::context::ExecutionContext;
use crate::error::{HandlerError, McpError};
use crate::handler::{Handler, HandlerResult};
use crate::registry::HandlerDescriptor;

/// Authorization predicate evaluated before an operation executes.
///
/// Returning `Ok(false)` is converted into an unauthorized failure by the
/// chain; returning `Err` propagates that failure unchanged.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn can_activate(&self, ctx: &ExecutionContext) -> Result<bool, HandlerError>;

    /// Name reported when this guard rejects a request.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Wrapper around the remainder of the chain.
///
/// An interceptor decides whether to call `next` (zero, one or several
/// times) and how to transform its result or failure.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next<'_>) -> HandlerResult;
}

/// The inner interceptors followed by the handler.
///
/// `Next` is `Copy`, so an interceptor may run it more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], handler: &'a dyn Handler) -> Self {
        Self {
            interceptors,
            handler,
        }
    }

    /// Number of interceptors still wrapping the handler.
    pub fn depth(&self) -> usize {
        self.interceptors.len()
    }

    pub async fn run(self, ctx: &ExecutionContext) -> HandlerResult {
        match self.interceptors.split_first() {
            Some((outer, inner)) => outer.intercept(ctx, Next::new(inner, self.handler)).await,
            None => self.handler.call(ctx.input().clone()).await,
        }
    }
}

/// Run every guard of `descriptor`, then its interceptors around its handler.
pub async fn run(descriptor: &HandlerDescriptor, ctx: &ExecutionContext) -> HandlerResult {
    for guard in descriptor.guards() {
        if !guard.can_activate(ctx).await? {
            warn!("guard {} rejected {}", guard.name(), descriptor.key());
            return Err(McpError::Unauthorized {
                message: format!("Access denied to {}", descriptor.key()),
                data: Some(serde_json::json!({
                    "guard": guard.name(),
                    "kind": descriptor.kind().to_string(),
                    "name": descriptor.key().name,
                })),
            }
            .into());
        }
    }

    Next::new(descriptor.interceptors(), descriptor.handler())
        .run(ctx)
        .await
}
