use serde::{Deserialize, Serialize};

use crate::registry::OperationKind;

// JSON-RPC 2.0 standard error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Implementation-defined codes (within -32000..-32099 server error range).
pub const SERVER_ERROR: i32 = -32000;
pub const UNAUTHORIZED: i32 = -32001;

/// Boxed error type accepted from handler code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured JSON-RPC 2.0 error object sent in error responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Protocol-level failures. Every variant maps onto exactly one JSON-RPC
/// error code through [`McpError::to_jsonrpc_error`].
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("parse error: {source}")]
    ParseError {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    #[error("{kind} not found: {name}")]
    NotFound {
        kind: OperationKind,
        name: String,
        data: Option<serde_json::Value>,
    },

    #[error("invalid params: {message}")]
    InvalidParams { message: String },

    #[error("invalid params: missing field `{field}`")]
    MissingField { field: String },

    #[error("unauthorized: {message}")]
    Unauthorized {
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("internal error: {message}")]
    InternalError { message: String },

    #[error("server error: {message}")]
    ServerError {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// An error carrying an explicit code, produced by error mappers and
    /// custom interceptors.
    #[error("{message} (code {code})")]
    Coded {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("message exceeds maximum size of {max_size} bytes (got {actual_size})")]
    OversizedMessage { max_size: usize, actual_size: usize },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl McpError {
    pub fn code(&self) -> i32 {
        match self {
            McpError::ParseError { .. } => PARSE_ERROR,
            McpError::InvalidRequest { .. } | McpError::OversizedMessage { .. } => INVALID_REQUEST,
            McpError::MethodNotFound { .. } | McpError::NotFound { .. } => METHOD_NOT_FOUND,
            McpError::InvalidParams { .. } | McpError::MissingField { .. } => INVALID_PARAMS,
            McpError::Unauthorized { .. } => UNAUTHORIZED,
            McpError::InternalError { .. } | McpError::Io { .. } => INTERNAL_ERROR,
            McpError::ServerError { .. } => SERVER_ERROR,
            McpError::Coded { code, .. } => *code,
        }
    }

    /// Convert to a JSON-RPC 2.0 error object for wire transmission.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let code = self.code();
        match self {
            McpError::ParseError { source } => JsonRpcError {
                code,
                message: format!("Parse error: {source}"),
                data: None,
            },
            McpError::InvalidRequest { message } => JsonRpcError {
                code,
                message: message.clone(),
                data: None,
            },
            McpError::MethodNotFound { method } => JsonRpcError {
                code,
                message: format!("Method not found: {method}"),
                data: None,
            },
            McpError::NotFound { kind, name, data } => JsonRpcError {
                code,
                message: format!("{} not found: {name}", kind.label()),
                data: data.clone(),
            },
            McpError::InvalidParams { message } => JsonRpcError {
                code,
                message: message.clone(),
                data: None,
            },
            McpError::MissingField { field } => JsonRpcError {
                code,
                message: format!("Missing required parameter: {field}"),
                data: Some(serde_json::json!({ "field": field })),
            },
            McpError::Unauthorized { message, data }
            | McpError::ServerError { message, data }
            | McpError::Coded { message, data, .. } => JsonRpcError {
                code,
                message: message.clone(),
                data: data.clone(),
            },
            McpError::InternalError { message } => JsonRpcError {
                code,
                message: message.clone(),
                data: None,
            },
            McpError::OversizedMessage {
                max_size,
                actual_size,
            } => JsonRpcError {
                code,
                message: format!(
                    "Message exceeds maximum size of {max_size} bytes (got {actual_size})"
                ),
                data: None,
            },
            McpError::Io { source } => JsonRpcError {
                code,
                message: format!("I/O error: {source}"),
                data: None,
            },
        }
    }
}

/// Failure raised by a handler, guard or interceptor.
///
/// `Protocol` failures are rendered as-is; the other two variants pass
/// through the error mapper before they reach the wire.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] McpError),

    #[error("{0}")]
    Failed(BoxError),

    #[error("non-error failure value: {0}")]
    Value(serde_json::Value),
}

impl HandlerError {
    /// An ordinary failure with the given message.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into().into())
    }

    pub fn new<E: Into<BoxError>>(error: E) -> Self {
        HandlerError::Failed(error.into())
    }

    pub fn as_protocol(&self) -> Option<&McpError> {
        match self {
            HandlerError::Protocol(error) => Some(error),
            _ => None,
        }
    }
}
