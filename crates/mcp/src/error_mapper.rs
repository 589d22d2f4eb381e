//! Normalization of arbitrary failures into protocol errors.
//!
//! Protocol failures always pass through untouched. Anything else is
//! handed to an [`ErrorMapper`]; the default one classifies ordinary errors
//! by substring markers in their message and turns non-error failure values
//! into a generic internal error.

use async_trait::async_trait;

use crate::chain::{Interceptor, Next};
use crate::context::ExecutionContext;
use crate::error::{HandlerError, McpError, INVALID_PARAMS, METHOD_NOT_FOUND, UNAUTHORIZED};
use crate::handler::HandlerResult;

/// Message used for failures that carry no error message of their own.
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// Converts a non-protocol failure into a protocol error.
pub trait ErrorMapper: Send + Sync {
    fn map_error(&self, error: HandlerError) -> McpError;
}

/// Substring-based classification, in fixed priority order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn map_error(&self, error: HandlerError) -> McpError {
        map_failure(error)
    }
}

/// The default mapping as a plain function, for mappers that wrap it.
pub fn map_failure(error: HandlerError) -> McpError {
    match error {
        HandlerError::Protocol(error) => error,
        HandlerError::Failed(error) => classify_message(&error.to_string()),
        HandlerError::Value(_) => McpError::InternalError {
            message: GENERIC_INTERNAL_MESSAGE.to_string(),
        },
    }
}

/// Pick a protocol code from case-sensitive markers in `message`:
/// "not found", then "invalid"/"validation", then
/// "permission"/"unauthorized", falling back to an internal error.
pub fn classify_message(message: &str) -> McpError {
    let code = if message.contains("not found") {
        METHOD_NOT_FOUND
    } else if message.contains("invalid") || message.contains("validation") {
        INVALID_PARAMS
    } else if message.contains("permission") || message.contains("unauthorized") {
        UNAUTHORIZED
    } else {
        return McpError::InternalError {
            message: message.to_string(),
        };
    };
    McpError::Coded {
        code,
        message: message.to_string(),
        data: None,
    }
}

/// Interceptor applying an [`ErrorMapper`] to everything raised inside it.
#[derive(Debug, Clone, Default)]
pub struct ErrorMappingInterceptor<M = DefaultErrorMapper> {
    mapper: M,
}

impl<M: ErrorMapper> ErrorMappingInterceptor<M> {
    pub fn new(mapper: M) -> Self {
        Self { mapper }
    }

    fn normalize(&self, error: HandlerError) -> HandlerError {
        match error {
            HandlerError::Protocol(error) => HandlerError::Protocol(error),
            other => HandlerError::Protocol(self.mapper.map_error(other)),
        }
    }
}

impl ErrorMappingInterceptor {
    /// Interceptor using [`DefaultErrorMapper`].
    pub fn standard() -> Self {
        Self::new(DefaultErrorMapper)
    }
}

#[async_trait]
impl<M: ErrorMapper + 'static> Interceptor for ErrorMappingInterceptor<M> {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next<'_>) -> HandlerResult {
        next.run(ctx).await.map_err(|error| self.normalize(error))
    }
}
