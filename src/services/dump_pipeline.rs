//! Dump, convert and deliver pipeline.
//!
//! [`DumpPipeline::run_cycle`] performs one dump cycle. It never fails: every
//! problem is logged and reported as a [`CycleOutcome`], so a bad cycle never
//! ends the schedule or the hosting process. At most one cycle runs at a time
//! per pipeline; a cycle requested while another one is running is skipped.
//!
//! [`ScheduledDumpLoop`] drives the pipeline on a fixed interval from a single
//! task, so scheduled cycles are strictly sequential.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::SourceError;
use crate::domain::ports::{DeliveryTarget, RawDumpSource, ReportConverter};

/// What happened to a single dump cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The report was durably accepted by the delivery target
    Delivered,
    /// The target did not accept the report
    DeliveryFailed,
    /// The source could not produce a dump; nothing was lost by this cycle
    SnapshotFailed,
    /// The transport to the source is gone
    SourceLost,
    /// The dump was taken but could not be converted; its data is lost
    ConversionFailed,
    /// Another cycle was still running, this one was skipped
    Busy,
    /// The cycle panicked; the panic was contained
    Panicked,
}

/// One dump-convert-deliver pipeline bound to a single source.
pub struct DumpPipeline {
    source: Arc<dyn RawDumpSource>,
    converter: Arc<dyn ReportConverter>,
    target: Arc<dyn DeliveryTarget>,
    cycle_lock: Mutex<()>,
    partition: RwLock<Option<String>>,
}

impl DumpPipeline {
    pub fn new(
        source: Arc<dyn RawDumpSource>,
        converter: Arc<dyn ReportConverter>,
        target: Arc<dyn DeliveryTarget>,
    ) -> Self {
        Self {
            source,
            converter,
            target,
            cycle_lock: Mutex::new(()),
            partition: RwLock::new(None),
        }
    }

    /// Run one cycle unless another one is in progress
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Previous dump cycle still running, skipping this one");
            return CycleOutcome::Busy;
        };

        match AssertUnwindSafe(self.run_cycle_unguarded()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Dump cycle panicked; the next cycle will run as scheduled");
                CycleOutcome::Panicked
            }
        }
    }

    async fn run_cycle_unguarded(&self) -> CycleOutcome {
        debug!(source = %self.source.describe(), "Starting dump");

        let mut dump = match self.source.snapshot_and_reset().await {
            Ok(dump) => dump,
            Err(err) if err.is_connection_lost() => {
                error!(
                    error = %err,
                    "Failed to dump execution data. Most likely the connection to the application was interrupted"
                );
                return CycleOutcome::SourceLost;
            }
            Err(err) => {
                error!(error = %err, "Dumping failed, retrying later");
                return CycleOutcome::SnapshotFailed;
            }
        };

        if dump.session_id.is_empty() {
            // runtimes that do not track sessions get the agent's partition
            if let Some(partition) = self.partition().await {
                dump.session_id = partition;
            }
        }

        let session_id = dump.session_id.clone();
        let converter = Arc::clone(&self.converter);
        let started = Instant::now();
        let report = match tokio::task::spawn_blocking(move || converter.convert(&dump)).await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                error!(error = %err, session_id = %session_id, "Converting dump failed, its data is lost");
                return CycleOutcome::ConversionFailed;
            }
            Err(err) => {
                error!(error = %err, session_id = %session_id, "Converter aborted, dump data is lost");
                return CycleOutcome::ConversionFailed;
            }
        };
        info!(
            files = report.files().len(),
            covered_lines = report.covered_line_count(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Converted dump"
        );

        if self.target.deliver(&report).await {
            debug!(target_description = %self.target.describe(), "Dump cycle finished");
            CycleOutcome::Delivered
        } else {
            warn!(target_description = %self.target.describe(), "Report was not accepted by the delivery target");
            CycleOutcome::DeliveryFailed
        }
    }

    /// On-demand dump, e.g. triggered through the control surface
    pub async fn trigger_dump(&self) -> CycleOutcome {
        debug!("Dumping report triggered on demand");
        self.run_cycle().await
    }

    /// Discard the current counters without converting them
    pub async fn reset(&self) -> Result<(), SourceError> {
        let _guard = self.cycle_lock.lock().await;
        debug!("Resetting coverage");
        self.source.reset().await
    }

    /// Change the partition used for subsequent dumps
    pub async fn set_partition(&self, partition: &str) -> Result<(), SourceError> {
        debug!(partition, "Changing partition");
        *self.partition.write().await = Some(partition.to_string());
        self.source.set_session_id(partition).await
    }

    pub async fn partition(&self) -> Option<String> {
        self.partition.read().await.clone()
    }

    pub fn target(&self) -> &Arc<dyn DeliveryTarget> {
        &self.target
    }

    pub fn source(&self) -> &Arc<dyn RawDumpSource> {
        &self.source
    }
}

/// Periodic driver of a [`DumpPipeline`].
pub struct ScheduledDumpLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledDumpLoop {
    /// Start dumping every `period`, first dump after one period
    pub fn start(pipeline: Arc<DumpPipeline>, period: Duration) -> Self {
        Self::spawn(pipeline, period, CancellationToken::new(), false)
    }

    /// Start a loop for a connected session.
    ///
    /// `job` is cancelled when the loop stops, including when a cycle finds
    /// the source's transport gone, which is the session's signal to
    /// reconnect.
    pub fn bound_to_session(
        pipeline: Arc<DumpPipeline>,
        period: Duration,
        job: CancellationToken,
    ) -> Self {
        Self::spawn(pipeline, period, job, true)
    }

    fn spawn(
        pipeline: Arc<DumpPipeline>,
        period: Duration,
        token: CancellationToken,
        cancel_on_source_lost: bool,
    ) -> Self {
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        info!("Requesting scheduled dump");
                        let outcome = pipeline.run_cycle().await;
                        if outcome == CycleOutcome::SourceLost && cancel_on_source_lost {
                            warn!("Source connection lost, cancelling dump job");
                            loop_token.cancel();
                            break;
                        }
                    }
                }
            }
            debug!("Scheduled dump loop stopped");
        });

        Self { token, handle }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the timer, waiting for a cycle in progress to finish
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            error!(error = %err, "Scheduled dump loop terminated abnormally");
        }
    }
}
