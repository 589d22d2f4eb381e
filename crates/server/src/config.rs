//! Server configuration: a TOML file overlaid with command-line flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use switchboard_common::LogLevel;
use switchboard_mcp::dispatcher::DEFAULT_MAX_BATCH_CONCURRENCY;
use switchboard_mcp::{ServerInfo, MAX_MESSAGE_SIZE};

use crate::cli::CliArgs;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub logging: LoggingSection,
    pub transport: TransportSection,
    pub dispatch: DispatchSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "switchboard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    pub auth_token: Option<String>,
    pub max_message_size: usize,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            auth_token: None,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub max_batch_concurrency: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_batch_concurrency: DEFAULT_MAX_BATCH_CONCURRENCY,
        }
    }
}

impl Config {
    /// Parse a TOML document. `path` is only used for error reporting.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load the file named by `--config` (or start from defaults) and apply
    /// the remaining flags on top.
    pub fn resolve(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(level) = args.log_level {
            self.logging.level = level;
        }
        if let Some(name) = &args.server_name {
            self.server.name = name.clone();
        }
        if let Some(token) = &args.auth_token {
            self.transport.auth_token = Some(token.clone());
        }
        if let Some(limit) = args.max_batch_concurrency {
            self.dispatch.max_batch_concurrency = limit;
        }
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server.name.clone(),
            version: self.server.version.clone(),
            instructions: self.server.instructions.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "server.name must not be empty".to_string(),
            });
        }
        if self.transport.max_message_size == 0 {
            return Err(ConfigError::Invalid {
                message: "transport.max_message_size must be positive".to_string(),
            });
        }
        if self.dispatch.max_batch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "dispatch.max_batch_concurrency must be positive".to_string(),
            });
        }
        if self.transport.auth_token.as_deref() == Some("") {
            return Err(ConfigError::Invalid {
                message: "transport.auth_token must not be empty when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        Config::from_toml_str(content, Path::new("switchboard.toml"))
    }

    #[test]
    fn empty_document_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.name, "switchboard");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.transport.max_message_size, 1_048_576);
        assert_eq!(config.dispatch.max_batch_concurrency, 64);
    }

    #[test]
    fn every_section_is_read() {
        let config = parse(
            r#"
            [server]
            name = "edge"
            version = "2.0.0"
            instructions = "Use the add tool for sums."

            [logging]
            level = "debug"

            [transport]
            auth_token = "s3cret"
            max_message_size = 4096

            [dispatch]
            max_batch_concurrency = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.server.version, "2.0.0");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.transport.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(config.transport.max_message_size, 4096);
        assert_eq!(config.dispatch.max_batch_concurrency, 4);
        assert_eq!(
            config.server_info().instructions.as_deref(),
            Some("Use the add tool for sums.")
        );
    }

    #[test]
    fn unknown_key_is_rejected_with_path() {
        let err = parse("[server]\nnmae = \"typo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("switchboard.toml"));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(parse("[logging]\nlevel = \"chatty\"\n").is_err());
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let err = parse("[dispatch]\nmax_batch_concurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn cli_flags_override_file_values() {
        let mut config =
            parse("[server]\nname = \"file\"\n[logging]\nlevel = \"error\"\n").unwrap();
        config.apply_cli(&CliArgs {
            log_level: Some(LogLevel::Debug),
            server_name: Some("flag".to_string()),
            auth_token: Some("t".to_string()),
            max_batch_concurrency: Some(2),
            ..CliArgs::default()
        });
        assert_eq!(config.server.name, "flag");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.transport.auth_token.as_deref(), Some("t"));
        assert_eq!(config.dispatch.max_batch_concurrency, 2);
    }

    #[test]
    fn resolve_without_file_uses_defaults() {
        let config = Config::resolve(&CliArgs::default()).unwrap();
        assert_eq!(config, Config::default());
    }
}
