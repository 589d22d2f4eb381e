mod error;
mod parser;

pub mod chain;
pub mod context;
pub mod dispatcher;
pub mod error_mapper;
pub mod guards;
pub mod handler;
pub mod interceptors;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod uri_template;

pub use chain::{Guard, Interceptor, Next};
pub use context::ExecutionContext;
pub use dispatcher::{Dispatcher, DispatcherBuilder, Outgoing, RequestGate, ServerInfo};
pub use error::{
    BoxError, HandlerError, JsonRpcError, McpError, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR, UNAUTHORIZED,
};
pub use error_mapper::{DefaultErrorMapper, ErrorMapper, ErrorMappingInterceptor};
pub use handler::{async_handler_fn, handler_fn, Handler, HandlerInput, HandlerResult};
pub use parser::{
    parse_bytes, parse_jsonrpc, parse_message, parse_request, Incoming, MAX_MESSAGE_SIZE,
};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallResult, ToolDefinition};
pub use registry::{
    HandlerDescriptor, OperationKey, OperationKind, Policy, Prompt, Registry, RegistryError,
    Resource, ResourceTemplate, Tool,
};
pub use server::{McpServer, TokenGate};
pub use uri_template::{TemplateError, UriTemplate, Variables};
