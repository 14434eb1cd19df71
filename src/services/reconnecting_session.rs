//! Reconnecting session to a recording runtime reached over a transport.
//!
//! The session cycles through `Disconnected -> Connecting -> Connected` until
//! it is shut down. While connected it runs a [`ScheduledDumpLoop`] bound to
//! the connection; the session restarts when that dump job is cancelled, the
//! remote side closes the transport, or a cycle finds the transport broken.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoffBuilder;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::models::{BackoffStrategy, SourceConfig};
use crate::domain::ports::{Connection, DeliveryTarget, DumpSourceConnector, ReportConverter};
use crate::services::dump_pipeline::{DumpPipeline, ScheduledDumpLoop};

/// Tracing target of events caused by reconnects, so frequent restarts can be
/// filtered out of the logs.
pub const RECONNECT_TARGET: &str = "coverage_relay::reconnect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Wait between failed connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub strategy: BackoffStrategy,
    pub interval: Duration,
    pub max_interval: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            interval,
            max_interval: interval,
        }
    }

    fn backoff(&self) -> Box<dyn Backoff + Send> {
        match self.strategy {
            BackoffStrategy::Fixed => Box::new(Constant::new(self.interval)),
            BackoffStrategy::Exponential => Box::new(
                ExponentialBackoffBuilder::new()
                    .with_initial_interval(self.interval)
                    .with_max_interval(self.max_interval)
                    .with_max_elapsed_time(None)
                    .build(),
            ),
        }
    }
}

impl From<&SourceConfig> for ReconnectPolicy {
    fn from(config: &SourceConfig) -> Self {
        let interval = Duration::from_secs(config.reconnect_interval_secs);
        Self {
            strategy: config.backoff,
            interval,
            max_interval: Duration::from_secs(config.max_reconnect_interval_secs).max(interval),
        }
    }
}

/// Keeps a dump pipeline attached to a remote recording runtime.
pub struct ReconnectingSession {
    connector: Arc<dyn DumpSourceConnector>,
    converter: Arc<dyn ReportConverter>,
    target: Arc<dyn DeliveryTarget>,
    dump_interval: Duration,
    policy: ReconnectPolicy,
    partition: Option<String>,
    dump_on_exit: bool,
    state: watch::Sender<SessionState>,
    transitions: broadcast::Sender<SessionState>,
}

impl ReconnectingSession {
    pub fn new(
        connector: Arc<dyn DumpSourceConnector>,
        converter: Arc<dyn ReportConverter>,
        target: Arc<dyn DeliveryTarget>,
        dump_interval: Duration,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (transitions, _) = broadcast::channel(64);
        Self {
            connector,
            converter,
            target,
            dump_interval,
            policy,
            partition: None,
            dump_on_exit: false,
            state,
            transitions,
        }
    }

    /// Partition applied to every new connection
    #[must_use]
    pub fn with_partition(mut self, partition: Option<String>) -> Self {
        self.partition = partition;
        self
    }

    /// Run one final cycle on the connected source when shut down
    #[must_use]
    pub fn with_dump_on_exit(mut self, dump_on_exit: bool) -> Self {
        self.dump_on_exit = dump_on_exit;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.transitions.subscribe()
    }

    fn transition(&self, next: SessionState) {
        self.state.send_replace(next);
        let _ = self.transitions.send(next);
    }

    /// Connect, dump and reconnect until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            source = %self.connector.describe(),
            dump_interval_secs = self.dump_interval.as_secs(),
            target_description = %self.target.describe(),
            "Starting reconnecting session"
        );

        let mut backoff = self.policy.backoff();
        let mut failed_attempts: u32 = 0;
        // failures after the first attempt or after any connection are restarts
        let mut fresh = true;

        while !shutdown.is_cancelled() {
            self.transition(SessionState::Connecting);

            let result = tokio::select! {
                () = shutdown.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match result {
                Ok(connection) => {
                    fresh = false;
                    failed_attempts = 0;
                    backoff.reset();
                    self.transition(SessionState::Connected);
                    self.serve(connection, &shutdown).await;
                    self.transition(SessionState::Disconnected);
                    if !shutdown.is_cancelled() {
                        info!(target: RECONNECT_TARGET, "Restarting");
                    }
                }
                Err(err) => {
                    self.transition(SessionState::Disconnected);
                    let wait = backoff.next_backoff().unwrap_or(self.policy.max_interval);
                    if fresh {
                        error!(
                            error = %err,
                            retry_in_secs = wait.as_secs(),
                            "Could not connect to the recording runtime. The application appears not to be running"
                        );
                    } else {
                        error!(
                            target: RECONNECT_TARGET,
                            error = %err,
                            attempt = failed_attempts + 1,
                            retry_in_secs = wait.as_secs(),
                            "Reconnect to the recording runtime failed"
                        );
                    }
                    fresh = false;
                    failed_attempts = failed_attempts.saturating_add(1);

                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        self.transition(SessionState::Disconnected);
        info!("Reconnecting session stopped");
    }

    /// Run a dump loop on `connection` until it has to be torn down
    async fn serve(&self, connection: Connection, shutdown: &CancellationToken) {
        let pipeline = Arc::new(DumpPipeline::new(
            Arc::clone(&connection.source),
            Arc::clone(&self.converter),
            Arc::clone(&self.target),
        ));
        if let Some(partition) = &self.partition {
            if let Err(err) = pipeline.set_partition(partition).await {
                warn!(error = %err, partition = %partition, "Failed to set partition on new connection");
            }
        }

        let job = CancellationToken::new();
        let dump_loop = ScheduledDumpLoop::bound_to_session(
            Arc::clone(&pipeline),
            self.dump_interval,
            job.clone(),
        );
        info!(source = %connection.source.describe(), "Connected successfully");

        let shutting_down = tokio::select! {
            () = job.cancelled() => {
                info!(target: RECONNECT_TARGET, "Dump job cancelled, reconnecting");
                false
            }
            () = connection.closed.cancelled() => {
                info!("Target application shut down. Restarting and waiting for new connection");
                false
            }
            () = shutdown.cancelled() => {
                info!("Shutting down connected session");
                true
            }
        };

        // a cycle in progress finishes before the final one starts
        dump_loop.stop().await;
        if shutting_down && self.dump_on_exit {
            let outcome = pipeline.run_cycle().await;
            info!(outcome = ?outcome, "Final dump finished");
        }
        connection.source.close().await;
    }
}
