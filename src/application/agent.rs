//! Local agent: one pipeline driven by a timer and the control surface.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::delivery::Delivery;
use crate::domain::models::Config;
use crate::domain::ports::RawDumpSource;
use crate::infrastructure::converter::ExecutionDataConverter;
use crate::infrastructure::http::ControlServer;
use crate::services::dump_pipeline::{DumpPipeline, ScheduledDumpLoop};
use crate::services::location_filter::LocationFilter;

pub struct Agent {
    pipeline: Arc<DumpPipeline>,
    dump_loop: Option<ScheduledDumpLoop>,
    shutdown: CancellationToken,
    server: Option<(SocketAddr, JoinHandle<()>)>,
    commit_detection: Option<JoinHandle<()>>,
    dump_on_exit: bool,
}

impl Agent {
    /// Wire up the pipeline for `source` and start the timer, the control
    /// server and commit detection as configured
    pub async fn start(config: &Config, source: Arc<dyn RawDumpSource>) -> Result<Self> {
        let filter = LocationFilter::parse(&config.includes, &config.excludes)
            .context("Invalid include/exclude patterns")?;
        let converter = Arc::new(ExecutionDataConverter::new(
            filter,
            config.duplicate_class_files,
        ));
        let delivery = Delivery::from_config(config)?;
        let pipeline = Arc::new(DumpPipeline::new(
            source,
            converter,
            Arc::clone(&delivery.target),
        ));

        if let Some(partition) = &config.partition {
            if let Err(err) = pipeline.set_partition(partition).await {
                warn!(error = %err, partition = %partition, "Could not apply the partition yet");
            }
        }

        let shutdown = CancellationToken::new();

        let server = match &config.http_server {
            Some(http) => {
                let listener = ControlServer::bind(http)
                    .await
                    .with_context(|| format!("Failed to bind {}:{}", http.host, http.port))?;
                let address = listener.local_addr()?;
                let server = ControlServer::new(Arc::clone(&pipeline));
                let stop = shutdown.clone();
                let handle = tokio::spawn(async move {
                    if let Err(err) = server
                        .serve_with_shutdown(listener, stop.cancelled_owned())
                        .await
                    {
                        error!(error = %err, "Control server failed");
                    }
                });
                Some((address, handle))
            }
            None => None,
        };

        let dump_loop = config
            .dump_interval()
            .map(|period| ScheduledDumpLoop::start(Arc::clone(&pipeline), period));
        let commit_detection = delivery.spawn_commit_detection(shutdown.clone());

        info!(
            source = %pipeline.source().describe(),
            target = %pipeline.target().describe(),
            dump_interval_minutes = config.dump_interval_minutes,
            control_server = ?server.as_ref().map(|(address, _)| *address),
            "Agent started"
        );

        Ok(Self {
            pipeline,
            dump_loop,
            shutdown,
            server,
            commit_detection,
            dump_on_exit: config.dump_on_exit,
        })
    }

    pub fn pipeline(&self) -> &Arc<DumpPipeline> {
        &self.pipeline
    }

    /// Address of the control server, if one is running
    pub fn http_address(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|(address, _)| *address)
    }

    /// Stop the timer, run the final dump if configured and release
    /// everything the agent holds
    pub async fn shutdown(self) {
        info!("Shutting down agent");
        self.shutdown.cancel();

        // a cycle in progress finishes before the final one starts
        if let Some(dump_loop) = self.dump_loop {
            dump_loop.stop().await;
        }
        if self.dump_on_exit {
            let outcome = self.pipeline.run_cycle().await;
            info!(outcome = ?outcome, "Final dump finished");
        }

        if let Some((_, handle)) = self.server {
            if let Err(err) = handle.await {
                error!(error = %err, "Control server task failed");
            }
        }
        if let Some(handle) = self.commit_detection {
            if let Err(err) = handle.await {
                error!(error = %err, "Commit detection task failed");
            }
        }

        self.pipeline.target().shutdown().await;
        self.pipeline.source().close().await;
        info!("Agent stopped");
    }
}
