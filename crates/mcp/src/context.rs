use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::handler::HandlerInput;
use crate::protocol::JsonRpcRequest;
use crate::registry::{HandlerDescriptor, OperationKey, OperationKind};

/// Per-invocation view handed to guards and interceptors.
///
/// Created fresh by the dispatcher for every invocation and owned by the
/// task executing it. The request and descriptor are shared read-only.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    request: Arc<JsonRpcRequest>,
    descriptor: Arc<HandlerDescriptor>,
    input: HandlerInput,
}

impl ExecutionContext {
    pub fn new(
        request: Arc<JsonRpcRequest>,
        descriptor: Arc<HandlerDescriptor>,
        input: HandlerInput,
    ) -> Self {
        Self {
            request,
            descriptor,
            input,
        }
    }

    pub fn request(&self) -> &JsonRpcRequest {
        &self.request
    }

    pub fn request_id(&self) -> Option<&Value> {
        self.request.id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn key(&self) -> &OperationKey {
        self.descriptor.key()
    }

    pub fn kind(&self) -> OperationKind {
        self.descriptor.kind()
    }

    pub fn name(&self) -> &str {
        &self.descriptor.key().name
    }

    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    /// Metadata attached to the operation at registration time.
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.descriptor.metadata(key)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata(key).and_then(Value::as_str)
    }

    pub fn is_public(&self) -> bool {
        self.descriptor.is_public()
    }

    /// The client-supplied `params._meta` object.
    pub fn meta(&self) -> Option<&Value> {
        self.request.meta()
    }

    pub fn input(&self) -> &HandlerInput {
        &self.input
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.input.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.input.argument(name)
    }

    pub fn uri(&self) -> Option<&str> {
        self.input.uri.as_deref()
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.input.variables
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.input.variable(name)
    }
}
