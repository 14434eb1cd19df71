//! Implementation of the `coverage-relay watch` command.

use anyhow::Result;
use clap::Args;

use crate::application::Watcher;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Host of the recording runtime
    #[arg(long)]
    pub host: Option<String>,

    /// Port of the recording runtime
    #[arg(long)]
    pub port: Option<u16>,

    /// Partition for the collected coverage
    #[arg(short, long)]
    pub partition: Option<String>,
}

pub async fn execute(args: WatchArgs, mut config: Config) -> Result<()> {
    if let Some(host) = args.host {
        config.source.host = host;
    }
    if let Some(port) = args.port {
        config.source.port = port;
    }
    if args.partition.is_some() {
        config.partition = args.partition;
    }

    Watcher::run(&config, super::shutdown_on_ctrl_c()).await
}
