//! Aggregation of per-test coverage fragments and assembly of the testwise
//! report.

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::models::{
    TestCoverageBuilder, TestDetails, TestExecution, TestInfo, TestwiseCoverageReport,
};

/// Coverage of every test seen so far, keyed by uniform path.
///
/// Fragments of the same test are unioned per file, so the result does not
/// depend on arrival order or duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestwiseCoverage {
    tests: BTreeMap<String, TestCoverageBuilder>,
}

impl TestwiseCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fragment; `None` and fragments without a uniform path are ignored
    pub fn add(&mut self, fragment: impl Into<Option<TestCoverageBuilder>>) {
        let Some(fragment) = fragment.into() else {
            return;
        };
        if fragment.uniform_path().is_empty() {
            debug!("Ignoring coverage fragment without uniform path");
            return;
        }

        match self.tests.entry(fragment.uniform_path().to_string()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(fragment),
            Entry::Vacant(slot) => {
                slot.insert(fragment);
            }
        }
    }

    /// Merge every test of `other`
    pub fn add_all(&mut self, other: TestwiseCoverage) {
        for fragment in other.tests.into_values() {
            self.add(fragment);
        }
    }

    pub fn get(&self, uniform_path: &str) -> Option<&TestCoverageBuilder> {
        self.tests.get(uniform_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCoverageBuilder> {
        self.tests.values()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn into_builders(self) -> btree_map::IntoValues<String, TestCoverageBuilder> {
        self.tests.into_values()
    }
}

impl Extend<TestCoverageBuilder> for TestwiseCoverage {
    fn extend<I: IntoIterator<Item = TestCoverageBuilder>>(&mut self, iter: I) {
        for fragment in iter {
            self.add(fragment);
        }
    }
}

impl FromIterator<TestCoverageBuilder> for TestwiseCoverage {
    fn from_iter<I: IntoIterator<Item = TestCoverageBuilder>>(iter: I) -> Self {
        let mut coverage = Self::new();
        coverage.extend(iter);
        coverage
    }
}

/// Collects details, execution and coverage of one test.
#[derive(Debug, Clone)]
pub struct TestInfoBuilder {
    uniform_path: String,
    details: Option<TestDetails>,
    execution: Option<TestExecution>,
    coverage: Option<TestCoverageBuilder>,
}

impl TestInfoBuilder {
    pub fn new(uniform_path: impl Into<String>) -> Self {
        Self {
            uniform_path: uniform_path.into(),
            details: None,
            execution: None,
            coverage: None,
        }
    }

    pub fn uniform_path(&self) -> &str {
        &self.uniform_path
    }

    pub fn set_details(&mut self, details: TestDetails) {
        self.details = Some(details);
    }

    pub fn set_execution(&mut self, execution: TestExecution) {
        self.execution = Some(execution);
    }

    pub fn set_coverage(&mut self, coverage: TestCoverageBuilder) {
        self.coverage = Some(coverage);
    }

    /// True iff no line was recorded for the test
    pub fn is_empty(&self) -> bool {
        self.coverage.as_ref().is_none_or(TestCoverageBuilder::is_empty)
    }

    pub fn build(self) -> TestInfo {
        let (source_path, content) = self
            .details
            .map(|d| (d.source_path, d.content))
            .unwrap_or_default();
        let (duration, result, message) = match self.execution {
            Some(execution) => (
                Some(execution.duration_seconds),
                Some(execution.result),
                execution.message,
            ),
            None => (None, None, None),
        };

        TestInfo {
            uniform_path: self.uniform_path,
            source_path,
            content,
            duration,
            result,
            message,
            paths: self
                .coverage
                .as_ref()
                .map(TestCoverageBuilder::paths)
                .unwrap_or_default(),
        }
    }
}

/// Joins test details, executions and coverage by uniform path.
#[derive(Debug, Default)]
pub struct TestwiseReportBuilder {
    tests: BTreeMap<String, TestInfoBuilder>,
    partial: bool,
    skip_empty: bool,
}

impl TestwiseReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the report as covering only a subset of all tests
    #[must_use]
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Leave out tests for which no line was recorded
    #[must_use]
    pub fn skip_tests_without_coverage(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    fn test(&mut self, uniform_path: &str) -> &mut TestInfoBuilder {
        self.tests
            .entry(uniform_path.to_string())
            .or_insert_with(|| TestInfoBuilder::new(uniform_path))
    }

    pub fn add_test_details(&mut self, details: impl IntoIterator<Item = TestDetails>) {
        for detail in details {
            let uniform_path = detail.uniform_path.clone();
            self.test(&uniform_path).set_details(detail);
        }
    }

    /// Add executions; a later execution of the same test replaces an earlier one
    pub fn add_test_executions(&mut self, executions: impl IntoIterator<Item = TestExecution>) {
        for execution in executions {
            let uniform_path = execution.uniform_path.clone();
            self.test(&uniform_path).set_execution(execution);
        }
    }

    pub fn add_coverage(&mut self, coverage: TestwiseCoverage) {
        for fragment in coverage.into_builders() {
            let uniform_path = fragment.uniform_path().to_string();
            self.test(&uniform_path).set_coverage(fragment);
        }
    }

    pub fn build(self) -> TestwiseCoverageReport {
        let skip_empty = self.skip_empty;
        TestwiseCoverageReport {
            partial: self.partial,
            tests: self
                .tests
                .into_values()
                .filter(|test| !(skip_empty && test.is_empty()))
                .map(TestInfoBuilder::build)
                .collect(),
        }
    }
}
