//! Delivery that waits for the commit the coverage belongs to.
//!
//! Until [`DelayedCommitGate::resolve`] is called, every report is written to
//! a local cache. Resolving creates the real target for the commit and drains
//! the cache into it on a background task. Delivery and resolution are
//! serialized by one lock, so a report racing with resolution is either
//! cached and drained or forwarded directly, never both.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::errors::DeliveryError;
use crate::domain::models::{CommitDescriptor, CoverageReport};
use crate::domain::ports::DeliveryTarget;
use crate::infrastructure::delivery::LocalFileCache;

/// Creates the delivery target once the commit is known
pub type TargetFactory = Box<
    dyn Fn(&CommitDescriptor) -> Result<Arc<dyn DeliveryTarget>, DeliveryError> + Send + Sync,
>;

enum GateState {
    Unresolved,
    Resolved {
        commit: CommitDescriptor,
        target: Arc<dyn DeliveryTarget>,
    },
}

/// Result of draining the cache into the resolved target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub forwarded: usize,
    pub failed: usize,
}

pub struct DelayedCommitGate {
    cache: LocalFileCache,
    factory: TargetFactory,
    state: Mutex<GateState>,
}

impl DelayedCommitGate {
    pub fn new(cache: LocalFileCache, factory: TargetFactory) -> Self {
        Self {
            cache,
            factory,
            state: Mutex::new(GateState::Unresolved),
        }
    }

    pub fn cache(&self) -> &LocalFileCache {
        &self.cache
    }

    pub async fn is_resolved(&self) -> bool {
        matches!(*self.state.lock().await, GateState::Resolved { .. })
    }

    /// Switch to the target for `commit` and drain the cache into it.
    ///
    /// Returns the drain task, or `None` if the gate was already resolved or
    /// the target could not be created.
    pub async fn resolve(&self, commit: CommitDescriptor) -> Option<JoinHandle<DrainSummary>> {
        let mut state = self.state.lock().await;

        if let GateState::Resolved { commit: existing, .. } = &*state {
            error!(
                resolved_commit = %existing,
                ignored_commit = %commit,
                "Commit was resolved twice. This is a programming error; keeping the first commit"
            );
            return None;
        }

        let target = match (self.factory)(&commit) {
            Ok(target) => target,
            Err(err) => {
                error!(
                    error = %err,
                    commit = %commit,
                    "Failed to create the delivery target for the resolved commit; reports stay cached"
                );
                return None;
            }
        };

        info!(
            commit = %commit,
            target = %target.describe(),
            "Commit resolved, uploading cached reports"
        );
        *state = GateState::Resolved {
            commit,
            target: Arc::clone(&target),
        };
        drop(state);

        let cache = self.cache.clone();
        Some(tokio::spawn(drain(cache, target)))
    }
}

async fn drain(cache: LocalFileCache, target: Arc<dyn DeliveryTarget>) -> DrainSummary {
    let mut summary = DrainSummary::default();

    let paths = match cache.list_cached().await {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = %err, dir = %cache.dir().display(), "Failed to list cached reports");
            return summary;
        }
    };

    for path in paths {
        let report = match cache.read(&path).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, path = %path.display(), "Failed to read cached report");
                summary.failed += 1;
                continue;
            }
        };

        if !target.deliver(&report).await {
            warn!(path = %path.display(), "Failed to forward cached report, leaving it in place");
            summary.failed += 1;
            continue;
        }

        summary.forwarded += 1;
        if let Err(err) = cache.delete(&path).await {
            warn!(
                error = %err,
                path = %path.display(),
                "Forwarded cached report but could not delete it"
            );
        }
    }

    info!(
        forwarded = summary.forwarded,
        failed = summary.failed,
        "Finished uploading cached reports"
    );
    summary
}

#[async_trait]
impl DeliveryTarget for DelayedCommitGate {
    async fn deliver(&self, report: &CoverageReport) -> bool {
        let state = self.state.lock().await;
        let target = match &*state {
            // cache while holding the lock so resolve cannot list around us
            GateState::Unresolved => return self.cache.deliver(report).await,
            GateState::Resolved { target, .. } => Arc::clone(target),
        };
        drop(state);
        target.deliver(report).await
    }

    fn describe(&self) -> String {
        match self.state.try_lock().as_deref() {
            Ok(GateState::Resolved { commit, target }) => {
                format!("{} (commit {commit})", target.describe())
            }
            Ok(GateState::Unresolved) => format!(
                "delayed upload, caching in {} until the commit is known",
                self.cache.dir().display()
            ),
            Err(_) => "delayed upload".to_string(),
        }
    }

    async fn shutdown(&self) {
        let state = self.state.lock().await;
        match &*state {
            GateState::Unresolved => {
                let cached = self.cache.list_cached().await.map(|p| p.len()).unwrap_or(0);
                error!(
                    dir = %self.cache.dir().display(),
                    cached_reports = cached,
                    "Shutting down before the commit was resolved. The cached reports were not \
                     uploaded and must be uploaded manually"
                );
            }
            GateState::Resolved { target, .. } => {
                let target = Arc::clone(target);
                drop(state);
                target.shutdown().await;
            }
        }
    }
}
