use clap::Parser;

use switchboard_common::logging::{LogEntry, StructuredLogger};
use switchboard_server::cli::CliArgs;
use switchboard_server::config::Config;
use switchboard_server::error::ServerError;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(error) = run(&args).await {
        let entry = LogEntry::now("error", "switchboard", error.to_string());
        match serde_json::to_string(&entry) {
            Ok(line) => eprintln!("{line}"),
            Err(_) => eprintln!("switchboard: {error}"),
        }
        std::process::exit(1);
    }
}

async fn run(args: &CliArgs) -> Result<(), ServerError> {
    let config = Config::resolve(args)?;
    StructuredLogger::stderr().install(config.logging.level)?;
    switchboard_server::serve(&config, tokio::io::stdin(), tokio::io::stdout()).await
}
