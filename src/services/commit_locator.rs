//! Detection of the commit from a `git.properties` file.
//!
//! Build tooling commonly writes `git.properties` next to the artifacts of
//! the application. The locator polls a directory until such a file appears
//! and turns `git.branch` and `git.commit.time` into a [`CommitDescriptor`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::DateTime;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::models::CommitDescriptor;

const FILE_NAME: &str = "git.properties";
const BRANCH_KEY: &str = "git.branch";
const COMMIT_TIME_KEY: &str = "git.commit.time";
const COMMIT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";
const MAX_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Key {0} is missing or empty")]
    MissingKey(&'static str),

    #[error("Invalid commit time '{value}': {source}")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Read the commit from the content of a `git.properties` file
pub fn parse_git_properties(content: &str) -> Result<CommitDescriptor, LocatorError> {
    let mut branch = None;
    let mut commit_time = None;

    for (key, value) in properties(content) {
        match key.as_str() {
            BRANCH_KEY => branch = Some(value),
            COMMIT_TIME_KEY => commit_time = Some(value),
            _ => {}
        }
    }

    let branch = branch
        .filter(|b| !b.is_empty())
        .ok_or(LocatorError::MissingKey(BRANCH_KEY))?;
    let commit_time = commit_time
        .filter(|t| !t.is_empty())
        .ok_or(LocatorError::MissingKey(COMMIT_TIME_KEY))?;
    let timestamp = DateTime::parse_from_str(&commit_time, COMMIT_TIME_FORMAT)
        .map_err(|source| LocatorError::InvalidTime {
            value: commit_time.clone(),
            source,
        })?
        .timestamp_millis();

    Ok(CommitDescriptor::new(branch, timestamp))
}

/// Key/value pairs of a properties file. Supports `=` and `:` separators,
/// `#` and `!` comments and backslash escapes; line continuations are not
/// used by `git.properties` and are not supported.
fn properties(content: &str) -> impl Iterator<Item = (String, String)> + '_ {
    content.lines().filter_map(|line| {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            return None;
        }

        let mut key = String::new();
        let mut chars = line.chars();
        let mut escaped = false;
        for c in chars.by_ref() {
            if escaped {
                key.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '=' || c == ':' {
                break;
            } else {
                key.push(c);
            }
        }
        Some((key.trim().to_string(), unescape(chars.as_str().trim())))
    })
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Polls a directory for `git.properties`.
#[derive(Debug, Clone)]
pub struct GitPropertiesLocator {
    search_dir: PathBuf,
    poll_interval: Duration,
}

impl GitPropertiesLocator {
    pub fn new(search_dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            search_dir: search_dir.into(),
            poll_interval,
        }
    }

    /// Search once and parse the first readable `git.properties`
    pub async fn locate(&self) -> Option<CommitDescriptor> {
        let search_dir = self.search_dir.clone();
        let found = tokio::task::spawn_blocking(move || find_properties_files(&search_dir))
            .await
            .unwrap_or_default();

        for path in found {
            match read_commit(&path).await {
                Ok(commit) => {
                    info!(path = %path.display(), commit = %commit, "Found commit in git.properties");
                    return Some(commit);
                }
                Err(err) => warn!(error = %err, path = %path.display(), "Ignoring git.properties"),
            }
        }
        None
    }

    /// Poll until a commit is found or `shutdown` is cancelled
    pub async fn watch(&self, shutdown: CancellationToken) -> Option<CommitDescriptor> {
        info!(
            dir = %self.search_dir.display(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Waiting for git.properties to determine the commit"
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Stopped waiting for git.properties");
                    return None;
                }
                _ = ticker.tick() => {
                    if let Some(commit) = self.locate().await {
                        return Some(commit);
                    }
                }
            }
        }
    }
}

fn find_properties_files(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(MAX_SEARCH_DEPTH)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == FILE_NAME)
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    found
}

async fn read_commit(path: &Path) -> Result<CommitDescriptor, LocatorError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LocatorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_git_properties(&content)
}
