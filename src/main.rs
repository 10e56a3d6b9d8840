mod cli;
mod config;
mod connector;
mod model;
mod util;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::RallyConfig;
use connector::rally::RallyConnector;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_args(&args)?;
    if command == Command::Help {
        cli::print_help();
        return Ok(());
    }

    let config = config::load_config()?;
    let connector = connect(config.rally)?;

    cli::run(command, &connector).await
}

fn connect(settings: RallyConfig) -> Result<RallyConnector> {
    let credentials = settings.credentials()?;
    tracing::debug!(server = %settings.server, "connecting");
    RallyConnector::with_reqwest(settings, credentials)
        .context("Failed to set up the Rally connector")
}
