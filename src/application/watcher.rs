//! Watcher: keeps a session to a remote recording runtime alive and dumps it
//! on a fixed interval.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::delivery::Delivery;
use crate::domain::models::Config;
use crate::infrastructure::converter::ExecutionDataConverter;
use crate::infrastructure::transport::TcpDumpConnector;
use crate::services::location_filter::LocationFilter;
use crate::services::reconnecting_session::{ReconnectPolicy, ReconnectingSession};

pub struct Watcher;

impl Watcher {
    /// Run until `shutdown` is cancelled, then shut the delivery target down
    pub async fn run(config: &Config, shutdown: CancellationToken) -> Result<()> {
        let Some(dump_interval) = config.dump_interval() else {
            bail!("The watcher needs a dump interval greater than 0 minutes");
        };

        let filter = LocationFilter::parse(&config.includes, &config.excludes)
            .context("Invalid include/exclude patterns")?;
        let converter = Arc::new(ExecutionDataConverter::new(
            filter,
            config.duplicate_class_files,
        ));
        let delivery = Delivery::from_config(config)?;
        let connector = Arc::new(TcpDumpConnector::from(&config.source));

        let session = ReconnectingSession::new(
            connector,
            converter,
            Arc::clone(&delivery.target),
            dump_interval,
            ReconnectPolicy::from(&config.source),
        )
        .with_partition(config.partition.clone())
        .with_dump_on_exit(config.dump_on_exit);

        let commit_detection = delivery.spawn_commit_detection(shutdown.clone());

        session.run(shutdown).await;

        if let Some(handle) = commit_detection {
            if let Err(err) = handle.await {
                error!(error = %err, "Commit detection task failed");
            }
        }
        delivery.target.shutdown().await;
        info!("Watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_requires_dump_interval() {
        let config = Config {
            dump_interval_minutes: 0,
            ..Default::default()
        };

        let err = Watcher::run(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dump interval"));
    }

    #[tokio::test]
    async fn test_stops_while_runtime_is_unreachable() {
        let dir = TempDir::new().unwrap();
        // grab a free port and release it so nothing listens there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut config = Config {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.source.host = "127.0.0.1".to_string();
        config.source.port = port;
        config.source.reconnect_interval_secs = 1;

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), Watcher::run(&config, shutdown))
            .await
            .expect("watcher did not stop")
            .unwrap();
    }
}
