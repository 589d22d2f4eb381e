//! JSON-RPC request dispatch.
//!
//! The [`Dispatcher`] turns decoded envelopes into responses: it validates
//! each envelope, routes protocol methods, resolves the target of invocation
//! methods against the [`Registry`], runs the operation's guard and
//! interceptor chain and shapes the outcome into the protocol's result form.
//! Batch members are dispatched concurrently and answered in input order.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::chain;
use crate::context::ExecutionContext;
use crate::error::{HandlerError, McpError};
use crate::error_mapper::{DefaultErrorMapper, ErrorMapper, GENERIC_INTERNAL_MESSAGE};
use crate::handler::HandlerInput;
use crate::parser::{
    extract_id, extract_missing_field, parse_message, parse_request, Incoming, MAX_MESSAGE_SIZE,
};
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, PromptGetParams, ResourceContents, ResourceUriParams,
    SetLevelParams, ToolCallParams, ToolCallResult, PROTOCOL_VERSION,
};
use crate::registry::{CapabilitySpec, HandlerDescriptor, OperationKind, Registry};
use crate::uri_template::Variables;

/// Default upper bound on batch members dispatched at the same time.
pub const DEFAULT_MAX_BATCH_CONCURRENCY: usize = 64;

/// Identity advertised in the `initialize` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "switchboard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
        }
    }
}

/// Admission check applied to every valid envelope before it is routed.
///
/// Transports use this to enforce authentication; a rejection is answered
/// with the returned error and the request is never dispatched.
pub trait RequestGate: Send + Sync {
    fn admit(&self, request: &JsonRpcRequest, registry: &Registry) -> Result<(), McpError>;
}

/// What goes back on the wire for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

impl Outgoing {
    /// All responses carried, in wire order.
    pub fn responses(&self) -> &[JsonRpcResponse] {
        match self {
            Outgoing::Single(response) => std::slice::from_ref(response),
            Outgoing::Batch(responses) => responses,
        }
    }
}

pub struct DispatcherBuilder {
    registry: Arc<Registry>,
    server_info: ServerInfo,
    error_mapper: Arc<dyn ErrorMapper>,
    gate: Option<Arc<dyn RequestGate>>,
    max_batch_concurrency: usize,
}

impl DispatcherBuilder {
    pub fn server_info(mut self, server_info: ServerInfo) -> Self {
        self.server_info = server_info;
        self
    }

    /// Replace the mapper applied to failures that reach the dispatcher
    /// without having been turned into protocol errors.
    pub fn error_mapper(mut self, mapper: impl ErrorMapper + 'static) -> Self {
        self.error_mapper = Arc::new(mapper);
        self
    }

    pub fn gate(mut self, gate: impl RequestGate + 'static) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Values below one are raised to one.
    pub fn max_batch_concurrency(mut self, limit: usize) -> Self {
        self.max_batch_concurrency = limit.max(1);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            registry: self.registry,
            server_info: self.server_info,
            error_mapper: self.error_mapper,
            gate: self.gate,
            max_batch_concurrency: self.max_batch_concurrency,
            subscriptions: Mutex::new(BTreeSet::new()),
        }
    }
}

/// Routes JSON-RPC envelopes to registered capabilities.
///
/// Shared behind an `Arc` by transports; every method takes `&self` and the
/// only mutable state is the resource subscription set.
pub struct Dispatcher {
    registry: Arc<Registry>,
    server_info: ServerInfo,
    error_mapper: Arc<dyn ErrorMapper>,
    gate: Option<Arc<dyn RequestGate>>,
    max_batch_concurrency: usize,
    subscriptions: Mutex<BTreeSet<String>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Arc<Registry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            server_info: ServerInfo::default(),
            error_mapper: Arc::new(DefaultErrorMapper),
            gate: None,
            max_batch_concurrency: DEFAULT_MAX_BATCH_CONCURRENCY,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// URIs currently subscribed to, in sorted order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock_subscriptions().iter().cloned().collect()
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.lock_subscriptions().contains(uri)
    }

    /// Decode and answer one raw message (a single envelope or a batch).
    ///
    /// Returns `None` when nothing must be written back.
    pub async fn handle_message(&self, line: &str) -> Option<Outgoing> {
        match parse_message(line, MAX_MESSAGE_SIZE) {
            Ok(incoming) => self.handle_incoming(incoming).await,
            Err(error) => {
                warn!("rejecting message: {error}");
                Some(Outgoing::Single(JsonRpcResponse::error(
                    Value::Null,
                    error.to_jsonrpc_error(),
                )))
            }
        }
    }

    pub async fn handle_incoming(&self, incoming: Incoming) -> Option<Outgoing> {
        match incoming {
            Incoming::Single(value) => self.handle_value(value).await.map(Outgoing::Single),
            Incoming::Batch(members) => self.handle_batch(members).await,
        }
    }

    /// Answer a batch. Members run concurrently, bounded by the configured
    /// limit, and their responses keep input order. A member that stays
    /// suspended holds one slot only; its siblings keep starting as others
    /// finish. Notifications leave no entry; a batch of only notifications
    /// yields `None`.
    pub async fn handle_batch(&self, members: Vec<Value>) -> Option<Outgoing> {
        if members.is_empty() {
            return Some(Outgoing::Single(JsonRpcResponse::error(
                Value::Null,
                McpError::InvalidRequest {
                    message: "Batch must contain at least one request".to_string(),
                }
                .to_jsonrpc_error(),
            )));
        }

        debug!("dispatching batch of {} messages", members.len());
        let mut answered: Vec<(usize, JsonRpcResponse)> =
            stream::iter(members.into_iter().enumerate())
                .map(|(index, member)| async move { (index, self.handle_value(member).await) })
                .buffer_unordered(self.max_batch_concurrency)
                .filter_map(|(index, response)| async move {
                    response.map(|response| (index, response))
                })
                .collect()
                .await;
        answered.sort_unstable_by_key(|(index, _)| *index);
        let responses: Vec<JsonRpcResponse> =
            answered.into_iter().map(|(_, response)| response).collect();

        if responses.is_empty() {
            None
        } else {
            Some(Outgoing::Batch(responses))
        }
    }

    /// Validate one envelope, apply the request gate and dispatch it.
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let request = match parse_request(value.clone()) {
            Ok(request) => request,
            Err(error) => {
                warn!("invalid request: {error}");
                return Some(JsonRpcResponse::error(
                    extract_id(&value),
                    error.to_jsonrpc_error(),
                ));
            }
        };

        if let Some(gate) = &self.gate {
            if let Err(error) = gate.admit(&request, &self.registry) {
                warn!("request `{}` refused: {error}", request.method);
                return request
                    .id
                    .map(|id| JsonRpcResponse::error(id, error.to_jsonrpc_error()));
            }
        }

        self.handle(request).await
    }

    /// Dispatch a validated request. Notifications are processed in full but
    /// never answered. A panic anywhere in the invocation is reported as an
    /// internal error.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let request = Arc::new(request);
        match request.id_label() {
            Some(rid) => info!(request_id = rid.as_str(); "dispatching {}", request.method),
            None => info!("dispatching notification {}", request.method),
        }

        let outcome = match AssertUnwindSafe(self.route(&request)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("handler for `{}` panicked", request.method);
                Err(McpError::InternalError {
                    message: GENERIC_INTERNAL_MESSAGE.to_string(),
                })
            }
        };

        let id = request.id.clone()?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error.to_jsonrpc_error()),
        })
    }

    /// Route a request by method and produce its `result` value.
    pub async fn route(&self, request: &Arc<JsonRpcRequest>) -> Result<Value, McpError> {
        match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "initialized" | "notifications/initialized" | "ping" => Ok(json!({})),

            "tools/list" => Ok(json!({ "tools": self.registry.tool_definitions() })),
            "resources/list" => Ok(json!({ "resources": self.registry.resource_definitions() })),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": self.registry.resource_template_definitions()
            })),
            "prompts/list" => Ok(json!({ "prompts": self.registry.prompt_definitions() })),

            "tools/call" => self.call_tool(request).await,
            "resources/read" => self.read_resource(request).await,
            "prompts/get" => self.get_prompt(request).await,

            "resources/subscribe" => {
                let params: ResourceUriParams = parse_params(&request.params)?;
                self.resolve_uri(&params.uri)?;
                self.lock_subscriptions().insert(params.uri);
                Ok(json!({}))
            }
            "resources/unsubscribe" => {
                let params: ResourceUriParams = parse_params(&request.params)?;
                self.lock_subscriptions().remove(&params.uri);
                Ok(json!({}))
            }

            "logging/setLevel" => {
                let params: SetLevelParams = parse_params(&request.params)?;
                log::set_max_level(params.level.to_level_filter());
                info!("log level set to {}", params.level);
                Ok(json!({}))
            }

            other => Err(McpError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    fn initialize_result(&self) -> Value {
        let mut result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": true, "listChanged": false },
                "prompts": { "listChanged": false },
                "logging": {}
            },
            "serverInfo": {
                "name": self.server_info.name,
                "version": self.server_info.version
            }
        });
        if let Some(instructions) = &self.server_info.instructions {
            result["instructions"] = json!(instructions);
        }
        result
    }

    async fn call_tool(&self, request: &Arc<JsonRpcRequest>) -> Result<Value, McpError> {
        let params: ToolCallParams = parse_params(&request.params)?;
        let descriptor = self
            .registry
            .tool(&params.name)
            .cloned()
            .ok_or_else(|| McpError::NotFound {
                kind: OperationKind::Tool,
                name: params.name.clone(),
                data: None,
            })?;

        let arguments = argument_object(params.arguments)?;
        if let CapabilitySpec::Tool { input_schema, .. } = descriptor.spec() {
            let required = input_schema
                .get("required")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str);
            require_fields(required, &arguments)?;
        }

        let value = self
            .invoke(request, &descriptor, HandlerInput::with_arguments(arguments))
            .await?;
        shape_tool_result(value)
    }

    async fn read_resource(&self, request: &Arc<JsonRpcRequest>) -> Result<Value, McpError> {
        let params: ResourceUriParams = parse_params(&request.params)?;
        let (descriptor, variables) = self.resolve_uri(&params.uri)?;

        let input = HandlerInput::for_resource(params.uri.clone(), variables);
        let value = self.invoke(request, &descriptor, input).await?;
        shape_resource_result(value, &params.uri, descriptor.mime_type())
    }

    async fn get_prompt(&self, request: &Arc<JsonRpcRequest>) -> Result<Value, McpError> {
        let params: PromptGetParams = parse_params(&request.params)?;
        let descriptor = self
            .registry
            .prompt(&params.name)
            .cloned()
            .ok_or_else(|| McpError::NotFound {
                kind: OperationKind::Prompt,
                name: params.name.clone(),
                data: None,
            })?;

        let arguments = argument_object(params.arguments)?;
        if let CapabilitySpec::Prompt {
            arguments: declared,
            ..
        } = descriptor.spec()
        {
            let required = declared
                .iter()
                .filter(|argument| argument.required)
                .map(|argument| argument.name.as_str());
            require_fields(required, &arguments)?;
        }

        let value = self
            .invoke(request, &descriptor, HandlerInput::with_arguments(arguments))
            .await?;
        Ok(shape_prompt_result(value, descriptor.description()))
    }

    /// Run the operation's chain; failures that are not yet protocol errors
    /// go through the error mapper.
    async fn invoke(
        &self,
        request: &Arc<JsonRpcRequest>,
        descriptor: &Arc<HandlerDescriptor>,
        input: HandlerInput,
    ) -> Result<Value, McpError> {
        let ctx = ExecutionContext::new(Arc::clone(request), Arc::clone(descriptor), input);
        chain::run(descriptor, &ctx).await.map_err(|error| match error {
            HandlerError::Protocol(error) => error,
            other => self.error_mapper.map_error(other),
        })
    }

    fn resolve_uri(
        &self,
        uri: &str,
    ) -> Result<(Arc<HandlerDescriptor>, Variables), McpError> {
        match self.registry.resolve_resource(uri) {
            Some(resolved) => Ok((resolved.descriptor, resolved.variables)),
            None => Err(McpError::NotFound {
                kind: OperationKind::Resource,
                name: uri.to_string(),
                data: Some(json!({
                    "uri": uri,
                    "availableResources": self
                        .registry
                        .resources()
                        .iter()
                        .map(|descriptor| descriptor.key().name.as_str())
                        .collect::<Vec<_>>(),
                    "availableTemplates": self
                        .registry
                        .resource_templates()
                        .iter()
                        .map(|descriptor| descriptor.key().name.as_str())
                        .collect::<Vec<_>>(),
                })),
            }),
        }
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deserialize method params, classifying serde errors into `MissingField`
/// or `InvalidParams`.
fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, McpError> {
    serde_json::from_value::<T>(params.clone()).map_err(|e| {
        let message = e.to_string();
        match extract_missing_field(&message) {
            Some(field) => McpError::MissingField { field },
            None => McpError::InvalidParams {
                message: format!("Invalid params: {message}"),
            },
        }
    })
}

fn argument_object(arguments: Value) -> Result<Map<String, Value>, McpError> {
    match arguments {
        Value::Object(arguments) => Ok(arguments),
        Value::Null => Ok(Map::new()),
        other => Err(McpError::InvalidParams {
            message: format!("arguments must be an object, got {}", json_type(&other)),
        }),
    }
}

fn require_fields<'a>(
    required: impl IntoIterator<Item = &'a str>,
    arguments: &Map<String, Value>,
) -> Result<(), McpError> {
    match required
        .into_iter()
        .find(|field| !arguments.contains_key(*field))
    {
        Some(field) => Err(McpError::MissingField {
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn has_array(value: &Value, field: &str) -> bool {
    value.get(field).is_some_and(Value::is_array)
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn to_result_value<T: Serialize>(value: &T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError {
        message: format!("failed to serialize result: {e}"),
    })
}

fn shape_tool_result(value: Value) -> Result<Value, McpError> {
    if has_array(&value, "content") {
        return Ok(value);
    }
    to_result_value(&ToolCallResult::text(into_text(value)))
}

fn shape_resource_result(
    value: Value,
    uri: &str,
    mime_type: Option<&str>,
) -> Result<Value, McpError> {
    if has_array(&value, "contents") {
        return Ok(value);
    }
    let contents = ResourceContents {
        uri: uri.to_string(),
        mime_type: mime_type.map(String::from),
        text: into_text(value),
    };
    Ok(json!({ "contents": [to_result_value(&contents)?] }))
}

fn shape_prompt_result(value: Value, description: Option<&str>) -> Value {
    let mut result = match value {
        Value::Object(object) if object.get("messages").is_some_and(Value::is_array) => {
            Value::Object(object)
        }
        Value::Array(messages) => json!({ "messages": messages }),
        other => json!({
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": into_text(other) }
            }]
        }),
    };
    if let (Some(description), Some(object)) = (description, result.as_object_mut()) {
        object
            .entry("description")
            .or_insert_with(|| json!(description));
    }
    result
}
