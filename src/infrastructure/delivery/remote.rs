//! Upload of coverage reports to the collection server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client as ReqwestClient;
use tracing::{error, info, warn};

use super::file_cache::LocalFileCache;
use crate::domain::errors::DeliveryError;
use crate::domain::models::{CommitDescriptor, CoverageReport, RemoteServerConfig};
use crate::domain::ports::DeliveryTarget;

/// Uploads each report as soon as it is delivered.
///
/// Failed uploads are written to a failure store so no coverage is lost.
/// `deliver` reports success when the report was either uploaded or stored.
pub struct ImmediateRemote {
    http_client: ReqwestClient,
    endpoint: String,
    project: String,
    user: String,
    access_token: String,
    message: String,
    commit: CommitDescriptor,
    failure_store: LocalFileCache,
}

impl ImmediateRemote {
    pub fn new(
        server: &RemoteServerConfig,
        commit: CommitDescriptor,
        failure_store: LocalFileCache,
    ) -> Result<Self, DeliveryError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(server.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: format!(
                "{}/api/projects/{}/external-analysis/session/auto-create/report",
                server.url.trim_end_matches('/'),
                server.project
            ),
            project: server.project.clone(),
            user: server.user.clone(),
            access_token: server.access_token.clone(),
            message: server.message.clone(),
            commit,
            failure_store,
        })
    }

    pub fn commit(&self) -> &CommitDescriptor {
        &self.commit
    }

    /// Send one report to the server
    pub async fn upload(&self, report: &CoverageReport) -> Result<(), DeliveryError> {
        let part = Part::text(report.to_json()?)
            .file_name(format!("coverage-{}.json", report.capture_millis()))
            .mime_str("application/json")?;
        let form = Form::new().part("report", part);

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[
                ("t", self.commit.to_string().as_str()),
                ("partition", report.partition()),
                ("message", self.message.as_str()),
                ("format", "JSON"),
            ])
            .basic_auth(&self.user, Some(&self.access_token))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Http(format!("server answered {status}: {body}")))
    }
}

#[async_trait]
impl DeliveryTarget for ImmediateRemote {
    async fn deliver(&self, report: &CoverageReport) -> bool {
        match self.upload(report).await {
            Ok(()) => {
                info!(
                    project = %self.project,
                    commit = %self.commit,
                    partition = %report.partition(),
                    "Uploaded coverage report"
                );
                return true;
            }
            Err(err) => {
                warn!(
                    error = %err,
                    endpoint = %self.endpoint,
                    "Upload failed, storing report for later upload"
                );
            }
        }

        match self.failure_store.store(report).await {
            Ok(path) => {
                info!(path = %path.display(), "Stored report after failed upload");
                true
            }
            Err(err) => {
                error!(
                    error = %err,
                    dir = %self.failure_store.dir().display(),
                    "Failed to store report after failed upload, coverage is lost"
                );
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("project {} at {} for commit {}", self.project, self.endpoint, self.commit)
    }
}
