use std::path::PathBuf;

use clap::Parser;

use switchboard_common::LogLevel;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "switchboard", version, about = "MCP capability server over stdio")]
pub struct CliArgs {
    /// TOML configuration file. Flags given here override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Initial level for stderr structured logs (debug, info, notice, warning,
    /// error, critical, alert, emergency).
    #[arg(long)]
    pub log_level: Option<LogLevel>,

    /// Server name reported in the `initialize` response.
    #[arg(long)]
    pub server_name: Option<String>,

    /// Shared token clients must send in `params._meta.authToken`.
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Maximum number of batch members dispatched concurrently.
    #[arg(long)]
    pub max_batch_concurrency: Option<usize>,
}
