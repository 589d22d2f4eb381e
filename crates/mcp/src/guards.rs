//! Ready-made guards.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::chain::Guard;
use crate::context::ExecutionContext;
use crate::error::{HandlerError, McpError};

/// Operation metadata key naming the permission an operation requires.
pub const PERMISSION_METADATA_KEY: &str = "permission";

/// Requires the caller to present a permission in `params._meta.permissions`.
///
/// The required permission is either fixed at construction or read from the
/// operation's `permission` metadata; an operation without that metadata is
/// let through.
#[derive(Debug, Clone, Default)]
pub struct RequirePermission {
    fixed: Option<String>,
}

impl RequirePermission {
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            fixed: Some(permission.into()),
        }
    }

    pub fn from_metadata() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Guard for RequirePermission {
    async fn can_activate(&self, ctx: &ExecutionContext) -> Result<bool, HandlerError> {
        let required = match &self.fixed {
            Some(permission) => permission.as_str(),
            None => match ctx.metadata_str(PERMISSION_METADATA_KEY) {
                Some(permission) => permission,
                None => return Ok(true),
            },
        };

        let provided: Vec<&str> = ctx
            .meta()
            .and_then(|meta| meta.get("permissions"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if provided.contains(&required) {
            return Ok(true);
        }

        Err(McpError::Unauthorized {
            message: format!("Missing permission `{required}` for {}", ctx.key()),
            data: Some(json!({ "required": required, "provided": provided })),
        }
        .into())
    }

    fn name(&self) -> &str {
        "require_permission"
    }
}

/// Guard backed by a synchronous predicate.
pub struct GuardFn<F> {
    name: String,
    predicate: F,
}

/// Build a guard from a named predicate over the execution context.
pub fn guard_fn<F>(name: impl Into<String>, predicate: F) -> GuardFn<F>
where
    F: Fn(&ExecutionContext) -> bool + Send + Sync,
{
    GuardFn {
        name: name.into(),
        predicate,
    }
}

#[async_trait]
impl<F> Guard for GuardFn<F>
where
    F: Fn(&ExecutionContext) -> bool + Send + Sync,
{
    async fn can_activate(&self, ctx: &ExecutionContext) -> Result<bool, HandlerError> {
        Ok((self.predicate)(ctx))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
