use switchboard_common::CommonError;
use switchboard_mcp::{McpError, RegistryError};

use crate::config::ConfigError;

/// Everything that can stop the `switchboard` binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("capability registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("logger setup failed: {0}")]
    Logging(#[from] CommonError),

    #[error("transport failed: {0}")]
    Mcp(#[from] McpError),
}
