pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;

use std::sync::Arc;

use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use switchboard_mcp::{Dispatcher, McpServer, TokenGate};

use crate::config::Config;
use crate::error::ServerError;

pub use crate::catalog::build_registry;

/// Build the dispatcher for `config`: the built-in catalog, the configured
/// server identity and batch limit, and token authentication when a token is
/// set.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, ServerError> {
    let registry = Arc::new(build_registry(config)?);
    let mut builder = Dispatcher::builder(registry)
        .server_info(config.server_info())
        .max_batch_concurrency(config.dispatch.max_batch_concurrency);
    if let Some(token) = &config.transport.auth_token {
        builder = builder.gate(TokenGate::new(token.clone()));
    }
    Ok(builder.build())
}

/// Serve `config` over the given streams until `input` reaches EOF.
pub async fn serve<R, W>(config: &Config, input: R, output: W) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let dispatcher = Arc::new(build_dispatcher(config)?);
    let registry = dispatcher.registry();
    info!(
        tools = registry.tools().len(),
        resources = registry.resources().len(),
        templates = registry.resource_templates().len(),
        prompts = registry.prompts().len();
        "serving {} {}",
        config.server.name,
        config.server.version
    );
    McpServer::new(dispatcher)
        .with_max_message_size(config.transport.max_message_size)
        .run(input, output)
        .await?;
    info!("input closed, shutting down");
    Ok(())
}
