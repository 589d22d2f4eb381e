use serde_json::{json, Value};

use switchboard_mcp::protocol::PromptArgument;
use switchboard_mcp::{
    handler_fn, HandlerError, Prompt, Registry, Resource, ResourceTemplate, Tool,
};

use crate::spies::{
    flaky_handler, recording_handler, Journal, RecordingGuard, RecordingInterceptor,
    RetryInterceptor,
};

/// A registry exercising every capability kind:
///
/// - `add`: sums `a` and `b`, both required
/// - `ordered`: interceptors `A` then `B` around a recording handler
/// - `guarded`: an allowing guard, a denying guard, then an interceptor
/// - `health`: public, returns `"ok"`
/// - `flaky`: fails twice, wrapped in a three-attempt retry
/// - `lookup`: fails with a "not found" message
/// - resource `config://app`, templates `file:///{filename}` and
///   `user:///{userId}/profile`
/// - prompt `greeting` with a required `name`
pub fn sample_registry(journal: &Journal) -> Registry {
    let mut registry = Registry::new();

    registry
        .register_tool(
            Tool::new(
                "add",
                handler_fn(|input| add(input.argument("a"), input.argument("b"))),
            )
            .description("Add two numbers")
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number" },
                    "b": { "type": "number" }
                },
                "required": ["a", "b"]
            })),
        )
        .unwrap();

    registry
        .register_tool(
            Tool::new("ordered", recording_handler("ordered", journal, Ok(json!("done"))))
                .interceptor(RecordingInterceptor::new("A", journal))
                .interceptor(RecordingInterceptor::new("B", journal)),
        )
        .unwrap();

    registry
        .register_tool(
            Tool::new("guarded", recording_handler("guarded", journal, Ok(json!("secret"))))
                .guard(RecordingGuard::allow("first", journal))
                .guard(RecordingGuard::deny("second", journal))
                .interceptor(RecordingInterceptor::new("guarded", journal)),
        )
        .unwrap();

    registry
        .register_tool(Tool::new("health", handler_fn(|_| Ok(json!("ok")))).public(true))
        .unwrap();

    registry
        .register_tool(
            Tool::new("flaky", flaky_handler(2, "temporarily unavailable", json!("recovered")))
                .interceptor(RetryInterceptor::new(3)),
        )
        .unwrap();

    registry
        .register_tool(Tool::new(
            "lookup",
            handler_fn(|_| Err(HandlerError::msg("record not found"))),
        ))
        .unwrap();

    registry
        .register_resource(
            Resource::new(
                "config://app",
                "Application config",
                handler_fn(|_| Ok(json!({ "theme": "dark" }))),
            )
            .mime_type("application/json"),
        )
        .unwrap();

    registry
        .register_resource_template(
            ResourceTemplate::new(
                "file:///{filename}",
                "Files",
                handler_fn(|input| {
                    let filename = input.variable("filename").unwrap_or_default();
                    Ok(json!(format!("contents of {filename}")))
                }),
            )
            .mime_type("text/plain"),
        )
        .unwrap();

    registry
        .register_resource_template(ResourceTemplate::new(
            "user:///{userId}/profile",
            "User profiles",
            handler_fn(|input| {
                let id: u64 = input
                    .variable("userId")
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| HandlerError::msg("invalid user id"))?;
                Ok(json!({ "id": id }))
            }),
        ))
        .unwrap();

    registry
        .register_prompt(
            Prompt::new(
                "greeting",
                handler_fn(|input| {
                    let name = input
                        .argument("name")
                        .and_then(Value::as_str)
                        .unwrap_or("friend");
                    Ok(json!(format!("Please greet {name} warmly.")))
                }),
            )
            .description("Greet someone by name")
            .argument(PromptArgument::required("name", "Who to greet")),
        )
        .unwrap();

    registry
}

/// Integer sum when both operands are integers, floating point otherwise.
fn add(a: Option<&Value>, b: Option<&Value>) -> Result<Value, HandlerError> {
    let exact = a
        .and_then(Value::as_i64)
        .zip(b.and_then(Value::as_i64))
        .and_then(|(a, b)| a.checked_add(b));
    match exact {
        Some(sum) => Ok(json!(sum)),
        None => Ok(json!(number(a)? + number(b)?)),
    }
}

fn number(value: Option<&Value>) -> Result<f64, HandlerError> {
    value
        .and_then(Value::as_f64)
        .ok_or_else(|| HandlerError::msg("invalid number argument"))
}

/// Serialize a request envelope as one JSON line (without the newline).
pub fn request_line(id: impl Into<Value>, method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id.into(), "method": method, "params": params }).to_string()
}

/// Serialize a notification envelope as one JSON line.
pub fn notification_line(method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "method": method, "params": params }).to_string()
}
