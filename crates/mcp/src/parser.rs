use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{JsonRpcRequest, JSONRPC_VERSION};

/// Maximum message size in bytes (1 MB). Messages exceeding this limit are
/// rejected before any JSON parsing. The stream server also stops buffering
/// a line once it grows past the limit.
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// A decoded inbound message: one envelope or a batch of them.
///
/// Members are kept as raw JSON so that each one can fail validation on its
/// own without affecting its siblings.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Single(Value),
    Batch(Vec<Value>),
}

/// Decode one transport message into a single envelope or a batch.
pub fn parse_message(line: &str, max_size: usize) -> Result<Incoming, McpError> {
    parse_bytes(line.as_bytes(), max_size)
}

/// Like [`parse_message`], for raw transport bytes. Input that is not valid
/// UTF-8 is a parse error.
pub fn parse_bytes(bytes: &[u8], max_size: usize) -> Result<Incoming, McpError> {
    if bytes.len() > max_size {
        return Err(McpError::OversizedMessage {
            max_size,
            actual_size: bytes.len(),
        });
    }

    let value: Value =
        serde_json::from_slice(bytes).map_err(|source| McpError::ParseError { source })?;

    Ok(match value {
        Value::Array(members) => Incoming::Batch(members),
        other => Incoming::Single(other),
    })
}

/// Parse a JSON-RPC 2.0 request from a single JSON line.
pub fn parse_jsonrpc(line: &str) -> Result<JsonRpcRequest, McpError> {
    match parse_message(line, MAX_MESSAGE_SIZE)? {
        Incoming::Single(value) => parse_request(value),
        Incoming::Batch(_) => Err(McpError::InvalidRequest {
            message: "Expected a single request, got a batch".to_string(),
        }),
    }
}

/// Validate one envelope and convert it into a typed request.
///
/// Checks, in order: the value is an object, the id (if any) is a string,
/// number or null, the envelope deserializes, `jsonrpc` is `"2.0"` and the
/// method is non-empty.
pub fn parse_request(value: Value) -> Result<JsonRpcRequest, McpError> {
    let Some(object) = value.as_object() else {
        return Err(McpError::InvalidRequest {
            message: "Request must be a JSON object".to_string(),
        });
    };

    if let Some(id) = object.get("id") {
        if !(id.is_string() || id.is_number() || id.is_null()) {
            return Err(McpError::InvalidRequest {
                message: "Request id must be a string, number or null".to_string(),
            });
        }
    }

    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
        let message = e.to_string();
        match extract_missing_field(&message) {
            Some(field) => McpError::InvalidRequest {
                message: format!("Missing required field: {field}"),
            },
            None => McpError::InvalidRequest {
                message: format!("Malformed request: {message}"),
            },
        }
    })?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest {
            message: format!(
                "Expected jsonrpc version \"2.0\", got \"{}\"",
                request.jsonrpc
            ),
        });
    }

    if request.method.is_empty() {
        return Err(McpError::InvalidRequest {
            message: "Method must be a non-empty string".to_string(),
        });
    }

    Ok(request)
}

/// Best-effort id extraction for error responses when full validation
/// fails. Returns `Value::Null` when no usable id is present.
pub fn extract_id(value: &Value) -> Value {
    match value.get("id") {
        Some(id) if id.is_string() || id.is_number() => id.clone(),
        _ => Value::Null,
    }
}

/// Extract a missing field name from a serde deserialization error message.
///
/// Serde produces error strings like "missing field `command` at line 1 column 23".
pub fn extract_missing_field(message: &str) -> Option<String> {
    let prefix = "missing field `";
    if let Some(start) = message.find(prefix) {
        let after = &message[start + prefix.len()..];
        if let Some(end) = after.find('`') {
            return Some(after[..end].to_string());
        }
    }
    None
}
