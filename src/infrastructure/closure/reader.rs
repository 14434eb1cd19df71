//! Reader for Google Closure coverage files recorded per test.
//!
//! Each file holds the coverage of one test run, extended with the test's
//! `uniformPath`. `executedLines[i][j]` tells whether line `j + 1` of
//! `fileNames[i]` was executed; `null` marks non-executable lines.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::domain::models::{FileCoverageBuilder, TestCoverageBuilder};
use crate::services::location_filter::LocationFilter;
use crate::services::testwise_aggregator::TestwiseCoverage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosureCoverage {
    #[serde(default)]
    uniform_path: Option<String>,
    #[serde(default)]
    file_names: Vec<String>,
    #[serde(default)]
    executed_lines: Vec<Vec<Option<bool>>>,
}

pub struct ClosureCoverageReader {
    inputs: Vec<PathBuf>,
    filter: LocationFilter,
}

impl ClosureCoverageReader {
    /// `inputs` are directories searched recursively for `*.json` files, or
    /// single coverage files
    pub fn new(inputs: Vec<PathBuf>, filter: LocationFilter) -> Self {
        Self { inputs, filter }
    }

    /// Read and merge the coverage of all inputs. Unreadable files are
    /// logged and skipped.
    pub fn read_test_coverage(&self) -> TestwiseCoverage {
        let mut coverage = TestwiseCoverage::new();
        for input in &self.inputs {
            if input.is_file() {
                coverage.add(self.read_file(input));
                continue;
            }
            for path in json_files(input) {
                coverage.add(self.read_file(&path));
            }
        }
        debug!(tests = coverage.len(), "Read closure coverage");
        coverage
    }

    fn read_file(&self, path: &Path) -> Option<TestCoverageBuilder> {
        let parsed = fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|content| {
                serde_json::from_str::<ClosureCoverage>(&content).map_err(|err| err.to_string())
            });
        match parsed {
            Ok(coverage) => self.convert(coverage, path),
            Err(err) => {
                error!(error = %err, path = %path.display(), "Error while reading closure coverage");
                None
            }
        }
    }

    fn convert(&self, coverage: ClosureCoverage, path: &Path) -> Option<TestCoverageBuilder> {
        let uniform_path = coverage.uniform_path.filter(|p| !p.is_empty())?;
        if coverage.file_names.len() != coverage.executed_lines.len() {
            warn!(
                path = %path.display(),
                file_names = coverage.file_names.len(),
                executed_lines = coverage.executed_lines.len(),
                "File names and executed lines differ in length, ignoring the surplus"
            );
        }

        let mut test = TestCoverageBuilder::new(uniform_path);
        for (file_name, lines) in coverage.file_names.iter().zip(coverage.executed_lines) {
            if !self.filter.is_included(file_name) {
                continue;
            }
            let mut file = FileCoverageBuilder::from_path(file_name);
            file.add_lines(
                lines
                    .iter()
                    .enumerate()
                    .filter(|(_, executed)| **executed == Some(true))
                    .filter_map(|(index, _)| u32::try_from(index + 1).ok()),
            );
            test.add(file);
        }
        Some(test)
    }
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}
