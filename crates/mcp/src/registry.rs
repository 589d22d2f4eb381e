//! Capability registration and lookup.
//!
//! A [`Registry`] is filled once during application wiring through the
//! `register_*` calls and is then shared read-only (behind an `Arc`) with
//! the dispatcher for the rest of the process lifetime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::chain::{Guard, Interceptor};
use crate::handler::Handler;
use crate::protocol::{
    JsonRpcRequest, PromptArgument, PromptDefinition, ResourceDefinition,
    ResourceTemplateDefinition, ToolDefinition,
};
use crate::uri_template::{self, TemplateError, UriTemplate, Variables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Tool,
    Resource,
    ResourceTemplate,
    Prompt,
}

impl OperationKind {
    /// Capitalized form used at the start of error messages.
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Tool => "Tool",
            OperationKind::Resource => "Resource",
            OperationKind::ResourceTemplate => "Resource template",
            OperationKind::Prompt => "Prompt",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Tool => "tool",
            OperationKind::Resource => "resource",
            OperationKind::ResourceTemplate => "resource template",
            OperationKind::Prompt => "prompt",
        })
    }
}

/// Uniquely identifies a capability: tools and prompts by name, resources
/// by URI, templates by their template string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub kind: OperationKind,
    pub name: String,
}

impl OperationKey {
    pub fn new(kind: OperationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.name)
    }
}

/// A policy object attached to an operation, in declaration order.
#[derive(Clone)]
pub enum Policy {
    Guard(Arc<dyn Guard>),
    Interceptor(Arc<dyn Interceptor>),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{key} is already registered")]
    Duplicate { key: OperationKey },

    #[error("invalid resource template `{template}`: {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("invalid registration for {key}: {message}")]
    InvalidRegistration { key: OperationKey, message: String },
}

/// Kind-specific metadata of a registered capability.
#[derive(Debug, Clone)]
pub enum CapabilitySpec {
    Tool {
        description: String,
        input_schema: Value,
    },
    Resource {
        uri: String,
        description: Option<String>,
        mime_type: Option<String>,
    },
    ResourceTemplate {
        template: UriTemplate,
        description: Option<String>,
        mime_type: Option<String>,
    },
    Prompt {
        description: Option<String>,
        arguments: Vec<PromptArgument>,
    },
}

/// The registry's immutable record for one operation.
pub struct HandlerDescriptor {
    key: OperationKey,
    title: String,
    handler: Arc<dyn Handler>,
    guards: Vec<Arc<dyn Guard>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    metadata: HashMap<String, Value>,
    public: bool,
    spec: CapabilitySpec,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("key", &self.key)
            .field("guards", &self.guards.len())
            .field("interceptors", &self.interceptors.len())
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl HandlerDescriptor {
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    pub fn kind(&self) -> OperationKind {
        self.key.kind
    }

    /// Display name: the tool or prompt name, or the resource's human name.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn guards(&self) -> &[Arc<dyn Guard>] {
        &self.guards
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    pub fn template(&self) -> Option<&UriTemplate> {
        match &self.spec {
            CapabilitySpec::ResourceTemplate { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match &self.spec {
            CapabilitySpec::Tool { description, .. } => Some(description.as_str()),
            CapabilitySpec::Resource { description, .. }
            | CapabilitySpec::ResourceTemplate { description, .. }
            | CapabilitySpec::Prompt { description, .. } => description.as_deref(),
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match &self.spec {
            CapabilitySpec::Resource { mime_type, .. }
            | CapabilitySpec::ResourceTemplate { mime_type, .. } => mime_type.as_deref(),
            _ => None,
        }
    }
}

/// Ordered guards, ordered interceptors and the remaining per-operation
/// attributes shared by all registration builders.
#[derive(Default)]
struct Attachments {
    guards: Vec<Arc<dyn Guard>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    metadata: HashMap<String, Value>,
    public: bool,
}

impl Attachments {
    fn push(&mut self, policy: Policy) {
        match policy {
            Policy::Guard(guard) => self.guards.push(guard),
            Policy::Interceptor(interceptor) => self.interceptors.push(interceptor),
        }
    }
}

macro_rules! attachment_setters {
    ($builder:ident) => {
        impl $builder {
            /// Append a guard; guards run in the order they are added.
            pub fn guard(mut self, guard: impl Guard + 'static) -> Self {
                self.attachments.push(Policy::Guard(Arc::new(guard)));
                self
            }

            /// Append an interceptor; the first one added is outermost.
            pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
                self.attachments
                    .push(Policy::Interceptor(Arc::new(interceptor)));
                self
            }

            /// Append an already-shared guard or interceptor.
            pub fn policy(mut self, policy: Policy) -> Self {
                self.attachments.push(policy);
                self
            }

            pub fn public(mut self, public: bool) -> Self {
                self.attachments.public = public;
                self
            }

            pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.attachments.metadata.insert(key.into(), value.into());
                self
            }
        }
    };
}

/// Registration builder for a tool.
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    handler: Arc<dyn Handler>,
    attachments: Attachments,
}

impl Tool {
    pub fn new(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
            handler,
            attachments: Attachments::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

attachment_setters!(Tool);

/// Registration builder for a static resource.
pub struct Resource {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    handler: Arc<dyn Handler>,
    attachments: Attachments,
}

impl Resource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            handler,
            attachments: Attachments::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

attachment_setters!(Resource);

/// Registration builder for a templated resource.
pub struct ResourceTemplate {
    template: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    handler: Arc<dyn Handler>,
    attachments: Attachments,
}

impl ResourceTemplate {
    pub fn new(
        template: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            template: template.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            handler,
            attachments: Attachments::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

attachment_setters!(ResourceTemplate);

/// Registration builder for a prompt.
pub struct Prompt {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
    handler: Arc<dyn Handler>,
    attachments: Attachments,
}

impl Prompt {
    pub fn new(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            handler,
            attachments: Attachments::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.push(argument);
        self
    }
}

attachment_setters!(Prompt);

/// A resource resolved for `resources/read`.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub descriptor: Arc<HandlerDescriptor>,
    pub variables: Variables,
}

/// Registered capabilities, kept per kind in registration order.
#[derive(Default)]
pub struct Registry {
    tools: Vec<Arc<HandlerDescriptor>>,
    resources: Vec<Arc<HandlerDescriptor>>,
    templates: Vec<Arc<HandlerDescriptor>>,
    prompts: Vec<Arc<HandlerDescriptor>>,
    index: HashMap<OperationKey, Arc<HandlerDescriptor>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tools.len())
            .field("resources", &self.resources.len())
            .field("templates", &self.templates.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: Tool) -> Result<Arc<HandlerDescriptor>, RegistryError> {
        let key = OperationKey::new(OperationKind::Tool, tool.name.clone());
        if tool.name.is_empty() {
            return Err(RegistryError::InvalidRegistration {
                key,
                message: "tool name must not be empty".to_string(),
            });
        }
        let descriptor = build_descriptor(
            key,
            tool.name,
            tool.handler,
            tool.attachments,
            CapabilitySpec::Tool {
                description: tool.description,
                input_schema: tool.input_schema,
            },
        );
        self.insert(descriptor)
    }

    pub fn register_resource(
        &mut self,
        resource: Resource,
    ) -> Result<Arc<HandlerDescriptor>, RegistryError> {
        let key = OperationKey::new(OperationKind::Resource, resource.uri.clone());
        if resource.uri.is_empty() {
            return Err(RegistryError::InvalidRegistration {
                key,
                message: "resource uri must not be empty".to_string(),
            });
        }
        let descriptor = build_descriptor(
            key,
            resource.name,
            resource.handler,
            resource.attachments,
            CapabilitySpec::Resource {
                uri: resource.uri,
                description: resource.description,
                mime_type: resource.mime_type,
            },
        );
        self.insert(descriptor)
    }

    pub fn register_resource_template(
        &mut self,
        resource: ResourceTemplate,
    ) -> Result<Arc<HandlerDescriptor>, RegistryError> {
        let template = UriTemplate::parse(&resource.template).map_err(|source| {
            RegistryError::InvalidTemplate {
                template: resource.template.clone(),
                source,
            }
        })?;
        let key = OperationKey::new(OperationKind::ResourceTemplate, resource.template);
        let descriptor = build_descriptor(
            key,
            resource.name,
            resource.handler,
            resource.attachments,
            CapabilitySpec::ResourceTemplate {
                template,
                description: resource.description,
                mime_type: resource.mime_type,
            },
        );
        self.insert(descriptor)
    }

    pub fn register_prompt(
        &mut self,
        prompt: Prompt,
    ) -> Result<Arc<HandlerDescriptor>, RegistryError> {
        let key = OperationKey::new(OperationKind::Prompt, prompt.name.clone());
        if prompt.name.is_empty() {
            return Err(RegistryError::InvalidRegistration {
                key,
                message: "prompt name must not be empty".to_string(),
            });
        }
        let descriptor = build_descriptor(
            key,
            prompt.name,
            prompt.handler,
            prompt.attachments,
            CapabilitySpec::Prompt {
                description: prompt.description,
                arguments: prompt.arguments,
            },
        );
        self.insert(descriptor)
    }

    fn insert(
        &mut self,
        descriptor: HandlerDescriptor,
    ) -> Result<Arc<HandlerDescriptor>, RegistryError> {
        if self.index.contains_key(&descriptor.key) {
            return Err(RegistryError::Duplicate {
                key: descriptor.key,
            });
        }
        let descriptor = Arc::new(descriptor);
        let bucket = match descriptor.kind() {
            OperationKind::Tool => &mut self.tools,
            OperationKind::Resource => &mut self.resources,
            OperationKind::ResourceTemplate => &mut self.templates,
            OperationKind::Prompt => &mut self.prompts,
        };
        bucket.push(Arc::clone(&descriptor));
        self.index
            .insert(descriptor.key.clone(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    pub fn get(&self, kind: OperationKind, name: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.index.get(&OperationKey::new(kind, name))
    }

    pub fn tool(&self, name: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.get(OperationKind::Tool, name)
    }

    pub fn prompt(&self, name: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.get(OperationKind::Prompt, name)
    }

    /// Resolve a concrete URI: an exact static resource wins, otherwise the
    /// first registered template that matches.
    pub fn resolve_resource(&self, uri: &str) -> Option<ResolvedResource> {
        if let Some(descriptor) = self.get(OperationKind::Resource, uri) {
            return Some(ResolvedResource {
                descriptor: Arc::clone(descriptor),
                variables: Variables::new(),
            });
        }

        let entries = self
            .templates
            .iter()
            .filter_map(|descriptor| descriptor.template().map(|t| (t, descriptor)));
        uri_template::resolve(uri, entries).map(|(descriptor, variables)| ResolvedResource {
            descriptor: Arc::clone(descriptor),
            variables,
        })
    }

    pub fn tools(&self) -> &[Arc<HandlerDescriptor>] {
        &self.tools
    }

    pub fn resources(&self) -> &[Arc<HandlerDescriptor>] {
        &self.resources
    }

    pub fn resource_templates(&self) -> &[Arc<HandlerDescriptor>] {
        &self.templates
    }

    pub fn prompts(&self) -> &[Arc<HandlerDescriptor>] {
        &self.prompts
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `request` targets an operation registered as public.
    ///
    /// Only invocation methods have a target; every other method yields
    /// `false`.
    pub fn is_public_request(&self, request: &JsonRpcRequest) -> bool {
        let target = |field: &str| request.params.get(field).and_then(Value::as_str);
        let descriptor = match request.method.as_str() {
            "tools/call" => target("name").and_then(|name| self.tool(name).cloned()),
            "prompts/get" => target("name").and_then(|name| self.prompt(name).cloned()),
            "resources/read" => target("uri")
                .and_then(|uri| self.resolve_resource(uri))
                .map(|resolved| resolved.descriptor),
            _ => None,
        };
        descriptor.is_some_and(|descriptor| descriptor.is_public())
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter_map(|descriptor| match descriptor.spec() {
                CapabilitySpec::Tool {
                    description,
                    input_schema,
                } => Some(ToolDefinition {
                    name: descriptor.key.name.clone(),
                    description: description.clone(),
                    input_schema: input_schema.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn resource_definitions(&self) -> Vec<ResourceDefinition> {
        self.resources
            .iter()
            .map(|descriptor| ResourceDefinition {
                uri: descriptor.key.name.clone(),
                name: descriptor.title.clone(),
                description: descriptor.description().map(String::from),
                mime_type: descriptor.mime_type().map(String::from),
            })
            .collect()
    }

    pub fn resource_template_definitions(&self) -> Vec<ResourceTemplateDefinition> {
        self.templates
            .iter()
            .map(|descriptor| ResourceTemplateDefinition {
                uri_template: descriptor.key.name.clone(),
                name: descriptor.title.clone(),
                description: descriptor.description().map(String::from),
                mime_type: descriptor.mime_type().map(String::from),
            })
            .collect()
    }

    pub fn prompt_definitions(&self) -> Vec<PromptDefinition> {
        self.prompts
            .iter()
            .filter_map(|descriptor| match descriptor.spec() {
                CapabilitySpec::Prompt {
                    description,
                    arguments,
                } => Some(PromptDefinition {
                    name: descriptor.key.name.clone(),
                    description: description.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

fn build_descriptor(
    key: OperationKey,
    title: String,
    handler: Arc<dyn Handler>,
    attachments: Attachments,
    spec: CapabilitySpec,
) -> HandlerDescriptor {
    HandlerDescriptor {
        key,
        title,
        handler,
        guards: attachments.guards,
        interceptors: attachments.interceptors,
        metadata: attachments.metadata,
        public: attachments.public,
        spec,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handler::handler_fn;

    fn noop() -> Arc<dyn Handler> {
        handler_fn(|_| Ok(Value::Null))
    }

    #[test]
    fn duplicate_tool_is_rejected() {
        let mut registry = Registry::new();
        registry.register_tool(Tool::new("add", noop())).unwrap();
        let err = registry.register_tool(Tool::new("add", noop())).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
        assert_eq!(registry.tools().len(), 1);
    }

    #[test]
    fn same_name_in_different_kinds_is_allowed() {
        let mut registry = Registry::new();
        registry.register_tool(Tool::new("greet", noop())).unwrap();
        registry.register_prompt(Prompt::new("greet", noop())).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn invalid_template_is_rejected_at_registration() {
        let mut registry = Registry::new();
        let err = registry
            .register_resource_template(ResourceTemplate::new("file:///{name", "files", noop()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTemplate { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn empty_tool_name_is_rejected() {
        let mut registry = Registry::new();
        let err = registry.register_tool(Tool::new("", noop())).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRegistration { .. }));
    }

    #[test]
    fn exact_resource_wins_over_template() {
        let mut registry = Registry::new();
        registry
            .register_resource_template(ResourceTemplate::new(
                "file:///{filename}",
                "files",
                noop(),
            ))
            .unwrap();
        registry
            .register_resource(Resource::new("file:///readme", "readme", noop()))
            .unwrap();

        let resolved = registry.resolve_resource("file:///readme").unwrap();
        assert_eq!(resolved.descriptor.kind(), OperationKind::Resource);
        assert!(resolved.variables.is_empty());

        let resolved = registry.resolve_resource("file:///notes.md").unwrap();
        assert_eq!(resolved.descriptor.kind(), OperationKind::ResourceTemplate);
        assert_eq!(resolved.variables["filename"], "notes.md");
    }

    #[test]
    fn first_registered_template_wins() {
        let mut registry = Registry::new();
        registry
            .register_resource_template(ResourceTemplate::new("doc:///{id}", "by id", noop()))
            .unwrap();
        registry
            .register_resource_template(ResourceTemplate::new("doc:///{slug}", "by slug", noop()))
            .unwrap();

        let resolved = registry.resolve_resource("doc:///intro").unwrap();
        assert_eq!(resolved.descriptor.title(), "by id");
        assert_eq!(resolved.variables["id"], "intro");
    }

    #[test]
    fn unmatched_uri_resolves_to_none() {
        let mut registry = Registry::new();
        registry
            .register_resource_template(ResourceTemplate::new(
                "file:///{filename}",
                "files",
                noop(),
            ))
            .unwrap();
        assert!(registry.resolve_resource("file:///a/b").is_none());
    }

    #[test]
    fn definitions_keep_registration_order() {
        let mut registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register_tool(Tool::new(name, noop())).unwrap();
        }
        let names: Vec<_> = registry
            .tool_definitions()
            .into_iter()
            .map(|def| def.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn metadata_and_public_flag_are_recorded() {
        let mut registry = Registry::new();
        let descriptor = registry
            .register_tool(
                Tool::new("stats", noop())
                    .metadata("permission", "admin")
                    .public(true),
            )
            .unwrap();
        assert_eq!(descriptor.metadata("permission"), Some(&json!("admin")));
        assert!(descriptor.is_public());
    }

    #[test]
    fn public_request_detection_follows_target() {
        let mut registry = Registry::new();
        registry
            .register_tool(Tool::new("health", noop()).public(true))
            .unwrap();
        registry.register_tool(Tool::new("add", noop())).unwrap();

        let public = JsonRpcRequest::new(1, "tools/call", json!({"name": "health"}));
        let private = JsonRpcRequest::new(2, "tools/call", json!({"name": "add"}));
        let listing = JsonRpcRequest::new(3, "tools/list", Value::Null);
        assert!(registry.is_public_request(&public));
        assert!(!registry.is_public_request(&private));
        assert!(!registry.is_public_request(&listing));
    }
}
