//! Directory of serialized coverage reports.
//!
//! Every report lands in its own `coverage-<captureMillis>.json` file. When a
//! file with the same capture time exists, a `-<n>` disambiguator is added
//! before the suffix. Only names of this shape are enumerated by
//! [`LocalFileCache::list_cached`], so the directory may be shared with other
//! files.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::domain::errors::DeliveryError;
use crate::domain::models::CoverageReport;
use crate::domain::ports::DeliveryTarget;

const FILE_PREFIX: &str = "coverage-";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct LocalFileCache {
    dir: PathBuf,
}

impl LocalFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `report` to a fresh file and return its path
    pub async fn store(&self, report: &CoverageReport) -> Result<PathBuf, DeliveryError> {
        let json = report.to_json()?;
        fs::create_dir_all(&self.dir).await?;

        let millis = report.capture_millis();
        let mut disambiguator = 0u32;
        loop {
            let path = self.dir.join(file_name(millis, disambiguator));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(json.as_bytes()).await?;
                    file.flush().await?;
                    debug!(path = %path.display(), "Cached coverage report");
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => disambiguator += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Paths of all cached reports, sorted by name. A missing directory has
    /// no cached reports.
    pub async fn list_cached(&self) -> Result<Vec<PathBuf>, DeliveryError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_cache_file = entry
                .file_name()
                .to_str()
                .is_some_and(is_cache_file_name);
            if is_cache_file && entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub async fn read(&self, path: &Path) -> Result<CoverageReport, DeliveryError> {
        let json = fs::read_to_string(path).await?;
        Ok(CoverageReport::from_json(&json)?)
    }

    pub async fn delete(&self, path: &Path) -> Result<(), DeliveryError> {
        fs::remove_file(path).await?;
        Ok(())
    }
}

fn file_name(millis: i64, disambiguator: u32) -> String {
    if disambiguator == 0 {
        format!("{FILE_PREFIX}{millis}{FILE_SUFFIX}")
    } else {
        format!("{FILE_PREFIX}{millis}-{disambiguator}{FILE_SUFFIX}")
    }
}

/// True for names produced by the cache: `coverage-<millis>[-<n>].json`
pub fn is_cache_file_name(name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix(FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
    else {
        return false;
    };
    let (millis, disambiguator) = stem.split_once('-').unwrap_or((stem, "0"));
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(millis) && all_digits(disambiguator)
}

#[async_trait]
impl DeliveryTarget for LocalFileCache {
    async fn deliver(&self, report: &CoverageReport) -> bool {
        match self.store(report).await {
            Ok(_) => true,
            Err(err) => {
                error!(
                    error = %err,
                    dir = %self.dir.display(),
                    "Failed to write coverage report to the output directory"
                );
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("local directory {}", self.dir.display())
    }
}
