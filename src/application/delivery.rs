//! Choice of the delivery target from the configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::models::{CommitDescriptor, Config};
use crate::domain::ports::DeliveryTarget;
use crate::infrastructure::delivery::{ImmediateRemote, LocalFileCache};
use crate::services::commit_locator::GitPropertiesLocator;
use crate::services::delayed_commit_gate::{DelayedCommitGate, TargetFactory};

/// Subdirectory of the output directory holding reports that wait for the
/// commit to be known
pub const PENDING_COMMIT_DIR: &str = "pending-commit";

/// Subdirectory of the output directory holding reports whose upload failed
pub const UPLOAD_FAILED_DIR: &str = "upload-failed";

/// The delivery target plus the gate behind it, if the commit is detected
/// at runtime.
pub struct Delivery {
    pub target: Arc<dyn DeliveryTarget>,
    gate: Option<(Arc<DelayedCommitGate>, GitPropertiesLocator)>,
}

impl Delivery {
    /// Build the target:
    /// - no upload server: reports stay in the output directory
    /// - upload server and a fixed commit: immediate upload
    /// - upload server and a `git.properties` directory: reports are cached
    ///   until the commit is found, then uploaded
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(server) = config.upload.server.clone() else {
            return Ok(Self {
                target: Arc::new(LocalFileCache::new(&config.output_dir)),
                gate: None,
            });
        };
        let failure_store = LocalFileCache::new(config.output_dir.join(UPLOAD_FAILED_DIR));

        if let Some(commit) = &config.upload.commit {
            let commit: CommitDescriptor = commit
                .parse()
                .with_context(|| format!("Invalid commit '{commit}'"))?;
            let remote = ImmediateRemote::new(&server, commit, failure_store)
                .context("Failed to create the upload client")?;
            return Ok(Self {
                target: Arc::new(remote),
                gate: None,
            });
        }

        let Some(search_dir) = config.upload.git_properties_dir.clone() else {
            bail!("Uploading requires either upload.commit or upload.git_properties_dir");
        };

        let factory: TargetFactory = Box::new(move |commit| {
            let remote = ImmediateRemote::new(&server, commit.clone(), failure_store.clone())?;
            Ok(Arc::new(remote) as Arc<dyn DeliveryTarget>)
        });
        let gate = Arc::new(DelayedCommitGate::new(
            LocalFileCache::new(config.output_dir.join(PENDING_COMMIT_DIR)),
            factory,
        ));
        let locator = GitPropertiesLocator::new(
            search_dir,
            Duration::from_secs(config.upload.git_properties_poll_secs),
        );

        Ok(Self {
            target: Arc::clone(&gate) as Arc<dyn DeliveryTarget>,
            gate: Some((gate, locator)),
        })
    }

    pub fn gate(&self) -> Option<&Arc<DelayedCommitGate>> {
        self.gate.as_ref().map(|(gate, _)| gate)
    }

    /// Start looking for the commit if the target is gated on it
    pub fn spawn_commit_detection(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let (gate, locator) = self.gate.clone()?;
        Some(tokio::spawn(async move {
            let Some(commit) = locator.watch(shutdown).await else {
                return;
            };
            match gate.resolve(commit).await {
                Some(drain) => match drain.await {
                    Ok(summary) => info!(
                        forwarded = summary.forwarded,
                        failed = summary.failed,
                        "Cached reports processed"
                    ),
                    Err(err) => warn!(error = %err, "Uploading cached reports was aborted"),
                },
                None => warn!("Detected commit was not applied"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RemoteServerConfig;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn server() -> RemoteServerConfig {
        RemoteServerConfig {
            url: "http://localhost:1".to_string(),
            project: "demo".to_string(),
            user: "build".to_string(),
            access_token: "token".to_string(),
            message: "upload".to_string(),
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_local_directory_without_server() {
        let dir = TempDir::new().unwrap();
        let delivery = Delivery::from_config(&config(&dir)).unwrap();

        assert!(delivery.gate().is_none());
        assert!(delivery.target.describe().contains("local directory"));
    }

    #[test]
    fn test_fixed_commit_uploads_immediately() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.upload.server = Some(server());
        config.upload.commit = Some("main:1700000000000".to_string());

        let delivery = Delivery::from_config(&config).unwrap();

        assert!(delivery.gate().is_none());
        assert!(delivery.target.describe().contains("main:1700000000000"));
    }

    #[test]
    fn test_git_properties_dir_gates_upload() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.upload.server = Some(server());
        config.upload.git_properties_dir = Some(dir.path().join("app"));

        let delivery = Delivery::from_config(&config).unwrap();

        let gate = delivery.gate().unwrap();
        assert_eq!(gate.cache().dir(), dir.path().join(PENDING_COMMIT_DIR));
    }

    #[test]
    fn test_server_without_commit_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.upload.server = Some(server());

        assert!(Delivery::from_config(&config).is_err());
    }
}
