//! Per-test coverage model.
//!
//! A [`TestCoverageBuilder`] is one coverage fragment for one test as read
//! from a single partial report source. Fragments of the same test are merged
//! by [`crate::services::TestwiseCoverage`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Covered lines of one file, accumulated while building testwise coverage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCoverageBuilder {
    folder: String,
    file_name: String,
    covered_lines: BTreeSet<u32>,
}

impl FileCoverageBuilder {
    pub fn new(folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
            covered_lines: BTreeSet::new(),
        }
    }

    /// Split a `/`-separated path into folder and file name
    pub fn from_path(path: &str) -> Self {
        let normalized = path.replace('\\', "/");
        match normalized.rsplit_once('/') {
            Some((folder, file_name)) => Self::new(folder, file_name),
            None => Self::new("", normalized),
        }
    }

    pub fn add_line(&mut self, line: u32) {
        self.covered_lines.insert(line);
    }

    pub fn add_lines(&mut self, lines: impl IntoIterator<Item = u32>) {
        self.covered_lines.extend(lines);
    }

    /// Union this file's lines with another file's lines
    pub fn merge(&mut self, other: Self) {
        if self.covered_lines.is_empty() {
            self.covered_lines = other.covered_lines;
        } else {
            self.covered_lines.extend(other.covered_lines);
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn covered_lines(&self) -> &BTreeSet<u32> {
        &self.covered_lines
    }

    pub fn is_empty(&self) -> bool {
        self.covered_lines.is_empty()
    }

    /// Covered lines as comma-separated ranges, e.g. `1-3,7`
    pub fn compact_lines(&self) -> String {
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for &line in &self.covered_lines {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == line => *end = line,
                _ => ranges.push((line, line)),
            }
        }
        ranges
            .iter()
            .map(|&(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn key(&self) -> (String, String) {
        (self.folder.clone(), self.file_name.clone())
    }
}

/// Coverage fragment of a single test: the files it touched and their lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCoverageBuilder {
    uniform_path: String,
    files: BTreeMap<(String, String), FileCoverageBuilder>,
}

impl TestCoverageBuilder {
    pub fn new(uniform_path: impl Into<String>) -> Self {
        Self {
            uniform_path: uniform_path.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn uniform_path(&self) -> &str {
        &self.uniform_path
    }

    /// Add a file; lines of an already known file are unioned
    pub fn add(&mut self, file: FileCoverageBuilder) {
        match self.files.entry(file.key()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(file),
            Entry::Vacant(slot) => {
                slot.insert(file);
            }
        }
    }

    /// Union all files of `other` into this fragment
    pub fn merge(&mut self, other: Self) {
        for (_, file) in other.files {
            self.add(file);
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &FileCoverageBuilder> {
        self.files.values()
    }

    pub fn file(&self, folder: &str, file_name: &str) -> Option<&FileCoverageBuilder> {
        self.files.get(&(folder.to_string(), file_name.to_string()))
    }

    /// True iff no line was ever recorded for this test
    pub fn is_empty(&self) -> bool {
        self.files.values().all(FileCoverageBuilder::is_empty)
    }

    /// Group the covered files by folder, dropping files without lines
    pub fn paths(&self) -> Vec<PathCoverage> {
        let mut by_folder: BTreeMap<&str, Vec<FileCoverage>> = BTreeMap::new();
        for file in self.files.values().filter(|f| !f.is_empty()) {
            by_folder.entry(&file.folder).or_default().push(FileCoverage {
                file_name: file.file_name.clone(),
                covered_lines: file.compact_lines(),
            });
        }
        by_folder
            .into_iter()
            .map(|(path, files)| PathCoverage {
                path: path.to_string(),
                files,
            })
            .collect()
    }
}

/// Static information about a test known to the test runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDetails {
    pub uniform_path: String,
    #[serde(default)]
    pub source_path: Option<String>,
    /// Content hash used to detect changed tests
    #[serde(default)]
    pub content: Option<String>,
}

impl TestDetails {
    pub fn new(uniform_path: impl Into<String>) -> Self {
        Self {
            uniform_path: uniform_path.into(),
            source_path: None,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestOutcome {
    Pass,
    Fail,
    Skipped,
    Error,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skipped => "SKIPPED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Outcome of running a test once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecution {
    pub uniform_path: String,
    pub duration_seconds: f64,
    pub result: TestOutcome,
    #[serde(default)]
    pub message: Option<String>,
}

/// Covered lines of one file in compact form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub file_name: String,
    pub covered_lines: String,
}

/// Covered files of one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCoverage {
    pub path: String,
    pub files: Vec<FileCoverage>,
}

/// Emission unit: everything known about one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    pub uniform_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub paths: Vec<PathCoverage>,
}

/// Testwise coverage report as emitted to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestwiseCoverageReport {
    /// True when only a subset of all tests was executed
    pub partial: bool,
    pub tests: Vec<TestInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_lines() {
        let mut file = FileCoverageBuilder::new("src", "a.js");
        file.add_lines([7, 1, 2, 3, 10, 11]);
        assert_eq!(file.compact_lines(), "1-3,7,10-11");

        assert_eq!(FileCoverageBuilder::new("", "b.js").compact_lines(), "");
    }

    #[test]
    fn test_from_path() {
        let file = FileCoverageBuilder::from_path("src/app/main.js");
        assert_eq!(file.folder(), "src/app");
        assert_eq!(file.file_name(), "main.js");

        let file = FileCoverageBuilder::from_path("main.js");
        assert_eq!(file.folder(), "");

        let file = FileCoverageBuilder::from_path("src\\win\\main.js");
        assert_eq!(file.folder(), "src/win");
    }

    #[test]
    fn test_fragment_add_unions_same_file() {
        let mut fragment = TestCoverageBuilder::new("T1");
        let mut first = FileCoverageBuilder::new("", "a.js");
        first.add_lines([1, 2]);
        let mut second = FileCoverageBuilder::new("", "a.js");
        second.add_lines([2, 3]);

        fragment.add(first);
        fragment.add(second);

        let lines: Vec<_> = fragment.file("", "a.js").unwrap().covered_lines().iter().copied().collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_paths_skip_empty_files() {
        let mut fragment = TestCoverageBuilder::new("T1");
        fragment.add(FileCoverageBuilder::new("src", "empty.js"));
        assert!(fragment.is_empty());
        assert!(fragment.paths().is_empty());

        let mut file = FileCoverageBuilder::new("src", "a.js");
        file.add_line(4);
        fragment.add(file);

        assert!(!fragment.is_empty());
        let paths = fragment.paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path, "src");
        assert_eq!(paths[0].files[0].covered_lines, "4");
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(serde_json::to_string(&TestOutcome::Skipped).unwrap(), "\"SKIPPED\"");
        let execution: TestExecution = serde_json::from_str(
            r#"{"uniformPath": "pkg.TestA", "durationSeconds": 0.5, "result": "PASS"}"#,
        )
        .unwrap();
        assert_eq!(execution.result, TestOutcome::Pass);
        assert!(execution.message.is_none());
    }
}
