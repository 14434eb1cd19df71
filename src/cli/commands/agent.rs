//! Implementation of the `coverage-relay agent` command.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::application::Agent;
use crate::domain::models::{Config, HttpServerConfig};
use crate::infrastructure::transport::{OnDemandDumpSource, TcpDumpConnector};

#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Partition for the collected coverage
    #[arg(short, long)]
    pub partition: Option<String>,

    /// Serve the control endpoints on this port
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Skip the final dump on shutdown
    #[arg(long)]
    pub no_dump_on_exit: bool,
}

impl AgentArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(partition) = &self.partition {
            config.partition = Some(partition.clone());
        }
        if let Some(port) = self.http_port {
            config
                .http_server
                .get_or_insert_with(HttpServerConfig::default)
                .port = port;
        }
        if self.no_dump_on_exit {
            config.dump_on_exit = false;
        }
    }
}

pub async fn execute(args: AgentArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);

    let connector = Arc::new(TcpDumpConnector::from(&config.source));
    let source = Arc::new(OnDemandDumpSource::new(connector));
    let agent = Agent::start(&config, source).await?;

    super::shutdown_on_ctrl_c().cancelled().await;
    agent.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_to_config() {
        let args = AgentArgs {
            partition: Some("Smoke".to_string()),
            http_port: Some(9000),
            no_dump_on_exit: true,
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.partition.as_deref(), Some("Smoke"));
        let http = config.http_server.unwrap();
        assert_eq!(http.port, 9000);
        assert_eq!(http.host, "127.0.0.1");
        assert!(!config.dump_on_exit);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = AgentArgs {
            partition: None,
            http_port: None,
            no_dump_on_exit: false,
        };
        let mut config = Config {
            partition: Some("From file".to_string()),
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.partition.as_deref(), Some("From file"));
        assert!(config.http_server.is_none());
        assert!(config.dump_on_exit);
    }
}
