//! The capabilities served by the `switchboard` binary.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::{json, Value};

use switchboard_mcp::guards::{RequirePermission, PERMISSION_METADATA_KEY};
use switchboard_mcp::interceptors::LoggingInterceptor;
use switchboard_mcp::protocol::PromptArgument;
use switchboard_mcp::{
    handler_fn, ErrorMappingInterceptor, HandlerError, HandlerInput, HandlerResult, Prompt,
    Registry, RegistryError, Resource, ResourceTemplate, Tool,
};

use crate::config::Config;

/// Documents readable through `file:///{filename}`.
const FILES: &[(&str, &str)] = &[
    (
        "readme.md",
        "# switchboard\n\nRoutes MCP requests to registered tools, resources and prompts.\n",
    ),
    (
        "notes.md",
        "Guards run before interceptors; the first declared interceptor is outermost.\n",
    ),
];

pub fn build_registry(config: &Config) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    let started = Instant::now();

    registry.register_tool(
        Tool::new("add", handler_fn(add))
            .description("Add two numbers")
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number", "description": "First addend" },
                    "b": { "type": "number", "description": "Second addend" }
                },
                "required": ["a", "b"]
            }))
            .interceptor(LoggingInterceptor)
            .interceptor(ErrorMappingInterceptor::standard()),
    )?;

    registry.register_tool(
        Tool::new(
            "echo",
            handler_fn(|input| {
                let text = input
                    .argument("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HandlerError::msg("invalid argument: text must be a string"))?;
                Ok(json!(text))
            }),
        )
        .description("Return the given text unchanged")
        .input_schema(json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }))
        .interceptor(ErrorMappingInterceptor::standard()),
    )?;

    registry.register_tool(
        Tool::new("health", handler_fn(|_| Ok(json!({ "status": "ok" }))))
            .description("Liveness probe; callable without credentials")
            .public(true),
    )?;

    registry.register_tool(
        Tool::new(
            "admin_stats",
            handler_fn(move |_| {
                Ok(json!({ "uptimeSeconds": started.elapsed().as_secs() }))
            }),
        )
        .description("Server statistics; requires the `admin` permission")
        .metadata(PERMISSION_METADATA_KEY, "admin")
        .guard(RequirePermission::from_metadata())
        .interceptor(LoggingInterceptor),
    )?;

    let server = json!({
        "name": config.server.name,
        "version": config.server.version,
        "maxBatchConcurrency": config.dispatch.max_batch_concurrency,
        "authRequired": config.transport.auth_token.is_some(),
    });
    registry.register_resource(
        Resource::new(
            "config://app",
            "Server configuration",
            handler_fn(move |_| Ok(server.clone())),
        )
        .description("Effective non-secret configuration")
        .mime_type("application/json"),
    )?;

    registry.register_resource_template(
        ResourceTemplate::new("file:///{filename}", "Documents", handler_fn(read_file))
            .description("Built-in documents by file name")
            .mime_type("text/markdown")
            .interceptor(ErrorMappingInterceptor::standard()),
    )?;

    registry.register_resource_template(
        ResourceTemplate::new(
            "user:///{userId}/profile",
            "User profiles",
            handler_fn(user_profile),
        )
        .mime_type("application/json")
        .interceptor(ErrorMappingInterceptor::standard()),
    )?;

    registry.register_prompt(
        Prompt::new("greeting", handler_fn(greeting))
            .description("Ask the model to greet someone")
            .argument(PromptArgument::required("name", "Who to greet"))
            .argument(PromptArgument::optional("style", "formal or casual")),
    )?;

    Ok(registry)
}

fn add(input: HandlerInput) -> HandlerResult {
    let operand = |name: &str| {
        input
            .argument(name)
            .filter(|value| value.is_number())
            .ok_or_else(|| HandlerError::msg(format!("invalid argument: {name} must be a number")))
    };
    let (a, b) = (operand("a")?, operand("b")?);
    let exact = a
        .as_i64()
        .zip(b.as_i64())
        .and_then(|(a, b)| a.checked_add(b));
    Ok(match exact {
        Some(sum) => json!(sum),
        None => json!(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default()),
    })
}

fn read_file(input: HandlerInput) -> HandlerResult {
    let filename = input.variable("filename").unwrap_or_default();
    let files: BTreeMap<&str, &str> = FILES.iter().copied().collect();
    files
        .get(filename)
        .map(|content| json!(content))
        .ok_or_else(|| HandlerError::msg(format!("file {filename} not found")))
}

fn user_profile(input: HandlerInput) -> HandlerResult {
    let raw = input.variable("userId").unwrap_or_default();
    let id: u64 = raw
        .parse()
        .map_err(|_| HandlerError::msg(format!("invalid user id `{raw}`")))?;
    Ok(json!({ "id": id, "name": format!("user-{id}") }))
}

fn greeting(input: HandlerInput) -> HandlerResult {
    let name = input
        .argument("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::msg("invalid argument: name must be a string"))?;
    let text = match input.argument("style").and_then(Value::as_str) {
        Some("formal") => format!("Please write a formal greeting addressed to {name}."),
        _ => format!("Say hi to {name} in a friendly, casual tone."),
    };
    Ok(json!([{ "role": "user", "content": { "type": "text", "text": text } }]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        build_registry(&Config::default()).unwrap()
    }

    #[test]
    fn every_capability_is_registered() {
        let registry = registry();
        let tools: Vec<_> = registry
            .tool_definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(tools, vec!["add", "echo", "health", "admin_stats"]);
        assert_eq!(registry.resources().len(), 1);
        assert_eq!(registry.resource_templates().len(), 2);
        assert_eq!(registry.prompts().len(), 1);
    }

    #[test]
    fn only_health_is_public() {
        let registry = registry();
        let public: Vec<_> = registry
            .tools()
            .iter()
            .filter(|tool| tool.is_public())
            .map(|tool| tool.key().name.clone())
            .collect();
        assert_eq!(public, vec!["health"]);
    }

    #[test]
    fn add_keeps_integers_exact() {
        let mut arguments = serde_json::Map::new();
        arguments.insert("a".to_string(), json!(5));
        arguments.insert("b".to_string(), json!(3));
        assert_eq!(add(HandlerInput::with_arguments(arguments)).unwrap(), json!(8));
    }

    #[test]
    fn add_rejects_non_numbers() {
        let mut arguments = serde_json::Map::new();
        arguments.insert("a".to_string(), json!("5"));
        arguments.insert("b".to_string(), json!(3));
        let err = add(HandlerInput::with_arguments(arguments)).unwrap_err();
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn unknown_file_reports_not_found() {
        let variables = [("filename".to_string(), "missing.md".to_string())].into();
        let input = HandlerInput::for_resource("file:///missing.md", variables);
        let err = read_file(input).unwrap_err();
        assert_eq!(err.to_string(), "file missing.md not found");
    }
}
