use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Line coverage of a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileCoverage {
    /// Directory of the file, `/`-separated, empty for the root
    pub folder: String,

    /// File name without directory
    pub file_name: String,

    /// Hit (`true`) or not-hit (`false`) per executable line
    pub lines: BTreeMap<u32, bool>,
}

impl SourceFileCoverage {
    /// Create an empty file coverage entry
    pub fn new(folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
            lines: BTreeMap::new(),
        }
    }

    /// Record a line; a hit always wins over a miss for the same line
    pub fn record(&mut self, line: u32, hit: bool) {
        let entry = self.lines.entry(line).or_insert(false);
        *entry |= hit;
    }

    /// Lines that were executed at least once
    pub fn covered_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines
            .iter()
            .filter_map(|(line, hit)| hit.then_some(*line))
    }

    /// Full `/`-separated path of the file
    pub fn path(&self) -> String {
        if self.folder.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.folder, self.file_name)
        }
    }
}

/// Structured coverage report produced from one raw dump.
///
/// Immutable once built; the fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    partition: String,
    captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uniform_path: Option<String>,
    files: Vec<SourceFileCoverage>,
}

impl CoverageReport {
    /// Build a report for all tests of a partition
    pub fn new(
        partition: impl Into<String>,
        captured_at: DateTime<Utc>,
        mut files: Vec<SourceFileCoverage>,
    ) -> Self {
        files.sort_by(|a, b| (&a.folder, &a.file_name).cmp(&(&b.folder, &b.file_name)));
        Self {
            partition: partition.into(),
            captured_at,
            uniform_path: None,
            files,
        }
    }

    /// Scope the report to a single logical test
    #[must_use]
    pub fn for_test(mut self, uniform_path: impl Into<String>) -> Self {
        self.uniform_path = Some(uniform_path.into());
        self
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Capture time in milliseconds since the epoch
    pub fn capture_millis(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }

    pub fn uniform_path(&self) -> Option<&str> {
        self.uniform_path.as_deref()
    }

    pub fn files(&self) -> &[SourceFileCoverage] {
        &self.files
    }

    /// Number of lines hit across all files
    pub fn covered_line_count(&self) -> usize {
        self.files.iter().map(|f| f.covered_lines().count()).sum()
    }

    /// Serialize to the JSON form used for caching and upload
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_wins_over_miss() {
        let mut file = SourceFileCoverage::new("src", "a.js");
        file.record(3, true);
        file.record(3, false);
        file.record(4, false);

        assert_eq!(file.covered_lines().collect::<Vec<_>>(), vec![3]);
        assert_eq!(file.lines.len(), 2);
    }

    #[test]
    fn test_path_of_root_file() {
        assert_eq!(SourceFileCoverage::new("", "a.js").path(), "a.js");
        assert_eq!(SourceFileCoverage::new("src/app", "a.js").path(), "src/app/a.js");
    }

    #[test]
    fn test_report_json_keeps_line_keys() {
        let mut file = SourceFileCoverage::new("com/foo", "Bar.java");
        file.record(10, true);
        file.record(12, false);
        let report = CoverageReport::new("Unit Tests", Utc::now(), vec![file]).for_test("T1");

        let parsed = CoverageReport::from_json(&report.to_json().unwrap()).unwrap();

        assert_eq!(parsed, report);
        assert_eq!(parsed.uniform_path(), Some("T1"));
        assert_eq!(parsed.covered_line_count(), 1);
    }
}
