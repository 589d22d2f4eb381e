use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::HandlerError;

pub type HandlerResult = Result<Value, HandlerError>;

/// Owned arguments handed to a handler on each invocation.
///
/// Tools and prompts receive `arguments`; resources receive the requested
/// `uri` and, when matched through a template, the extracted `variables`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerInput {
    pub arguments: Map<String, Value>,
    pub uri: Option<String>,
    pub variables: HashMap<String, String>,
}

impl HandlerInput {
    pub fn with_arguments(arguments: Map<String, Value>) -> Self {
        Self {
            arguments,
            ..Self::default()
        }
    }

    pub fn for_resource(uri: impl Into<String>, variables: HashMap<String, String>) -> Self {
        Self {
            arguments: Map::new(),
            uri: Some(uri.into()),
            variables,
        }
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }
}

/// The invocable behind a registered capability.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, input: HandlerInput) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(HandlerInput) -> HandlerResult + Send + Sync + 'static,
{
    async fn call(&self, input: HandlerInput) -> HandlerResult {
        (self.0)(input)
    }
}

struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for AsyncFnHandler<F>
where
    F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, input: HandlerInput) -> HandlerResult {
        (self.0)(input).await
    }
}

/// Wrap a synchronous closure as a handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(HandlerInput) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Wrap a closure returning a future as a handler.
pub fn async_handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(AsyncFnHandler(f))
}
