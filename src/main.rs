//! Coverage relay CLI entry point.

use clap::Parser;

use coverage_relay::cli::commands::{agent, impacted, testwise, watch};
use coverage_relay::cli::{handle_error, Cli, Commands};
use coverage_relay::infrastructure::config::ConfigLoader;
use coverage_relay::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    // keeps buffered file output alive until exit
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Agent(args) => agent::execute(args, config).await,
        Commands::Watch(args) => watch::execute(args, config).await,
        Commands::Testwise(args) => testwise::execute(args, cli.json).await,
        Commands::Impacted(args) => impacted::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
