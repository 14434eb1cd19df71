//! Mapping from uniform paths to the identifiers a local test engine runs.
//!
//! The registry is filled once from the locally discovered tests and only
//! read afterwards. Resolving an externally selected impacted-test list is
//! all or nothing: if a single uniform path is unknown, the whole selection is
//! distrusted and every known test is returned.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::domain::models::TestDetails;

const CLOSEST_MATCHES: usize = 5;

/// A test selected by an external impact analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactedTest {
    pub uniform_path: String,
    #[serde(default)]
    pub selection_reason: Option<String>,
}

impl ImpactedTest {
    pub fn new(uniform_path: impl Into<String>, selection_reason: impl Into<String>) -> Self {
        Self {
            uniform_path: uniform_path.into(),
            selection_reason: Some(selection_reason.into()),
        }
    }
}

/// Outcome of [`AvailableTests::resolve_impacted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<Id> {
    /// Every impacted test was known
    Selected(Vec<Id>),
    /// `unknown` was not found, so all known tests have to run
    FallbackToAll { unknown: String, all: Vec<Id> },
}

impl<Id> Resolution<Id> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackToAll { .. })
    }

    pub fn into_ids(self) -> Vec<Id> {
        match self {
            Self::Selected(ids) | Self::FallbackToAll { all: ids, .. } => ids,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvailableTests<Id> {
    entries: Vec<(Id, TestDetails)>,
    index: HashMap<String, usize>,
}

impl<Id> Default for AvailableTests<Id> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<Id: Clone> AvailableTests<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a locally executable test.
    ///
    /// Registering a uniform path again replaces its executable id in place.
    pub fn add(&mut self, executable_id: Id, details: TestDetails) {
        if let Some(&position) = self.index.get(&details.uniform_path) {
            warn!(
                uniform_path = %details.uniform_path,
                "Test registered twice, keeping the last executable id"
            );
            self.entries[position] = (executable_id, details);
            return;
        }
        self.index
            .insert(details.uniform_path.clone(), self.entries.len());
        self.entries.push((executable_id, details));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Details of every known test in registration order
    pub fn test_list(&self) -> Vec<TestDetails> {
        self.entries.iter().map(|(_, d)| d.clone()).collect()
    }

    pub fn executable_id(&self, uniform_path: &str) -> Option<&Id> {
        self.index.get(uniform_path).map(|&i| &self.entries[i].0)
    }

    /// Every known executable id in registration order
    pub fn all_ids(&self) -> Vec<Id> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Map impacted tests to executable ids, falling back to all tests on
    /// the first unknown uniform path
    pub fn resolve_impacted(&self, impacted: &[ImpactedTest]) -> Resolution<Id> {
        let mut seen = HashSet::with_capacity(impacted.len());
        let mut selected = Vec::with_capacity(impacted.len());

        for test in impacted {
            let Some(&position) = self.index.get(&test.uniform_path) else {
                let closest: Vec<String> = self
                    .closest_matches(&test.uniform_path, CLOSEST_MATCHES)
                    .into_iter()
                    .map(|(path, distance)| format!("{path} (distance {distance})"))
                    .collect();
                error!(
                    uniform_path = %test.uniform_path,
                    selection_reason = test.selection_reason.as_deref().unwrap_or(""),
                    closest = ?closest,
                    known_tests = self.entries.len(),
                    "Impacted test is not known locally. Running all tests instead of the selection"
                );
                return Resolution::FallbackToAll {
                    unknown: test.uniform_path.clone(),
                    all: self.all_ids(),
                };
            };
            if seen.insert(position) {
                selected.push(self.entries[position].0.clone());
            }
        }

        Resolution::Selected(selected)
    }

    /// Known uniform paths closest to `uniform_path` by edit distance.
    ///
    /// Ties keep registration order.
    pub fn closest_matches(&self, uniform_path: &str, limit: usize) -> Vec<(&str, usize)> {
        let mut candidates: Vec<(&str, usize)> = self
            .entries
            .iter()
            .map(|(_, d)| {
                let known = d.uniform_path.as_str();
                (known, strsim::levenshtein(uniform_path, known))
            })
            .collect();
        candidates.sort_by_key(|&(_, distance)| distance);
        candidates.truncate(limit);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(paths: &[&str]) -> AvailableTests<String> {
        let mut tests = AvailableTests::new();
        for path in paths {
            tests.add(format!("exec:{path}"), TestDetails::new(*path));
        }
        tests
    }

    #[test]
    fn test_all_known_tests_are_selected() {
        let tests = registry(&["pkg.TestA", "pkg.TestB", "pkg.TestC"]);

        let resolution = tests.resolve_impacted(&[
            ImpactedTest::new("pkg.TestC", "changed"),
            ImpactedTest::new("pkg.TestA", "changed"),
            ImpactedTest::new("pkg.TestC", "duplicate"),
        ]);

        assert_eq!(
            resolution,
            Resolution::Selected(vec!["exec:pkg.TestC".to_string(), "exec:pkg.TestA".to_string()])
        );
    }

    #[test]
    fn test_unknown_test_falls_back_to_all() {
        let tests = registry(&["pkg.TestA", "pkg.TestB"]);

        let resolution = tests.resolve_impacted(&[
            ImpactedTest::new("pkg.TestA", "changed"),
            ImpactedTest::new("pkg.TestC", "changed"),
        ]);

        assert!(resolution.is_fallback());
        assert_eq!(
            resolution.into_ids(),
            vec!["exec:pkg.TestA".to_string(), "exec:pkg.TestB".to_string()]
        );
    }

    #[test]
    fn test_empty_selection_selects_nothing() {
        let tests = registry(&["pkg.TestA"]);
        assert_eq!(tests.resolve_impacted(&[]), Resolution::Selected(vec![]));
    }

    #[test]
    fn test_closest_matches_are_stable() {
        let tests = registry(&["suite/b", "suite/a", "other/xyz", "suite/c", "suite/d", "suite/e"]);

        let closest: Vec<_> = tests
            .closest_matches("suite/x", 5)
            .into_iter()
            .map(|(path, _)| path)
            .collect();

        assert_eq!(closest, vec!["suite/b", "suite/a", "suite/c", "suite/d", "suite/e"]);
    }

    #[test]
    fn test_reregistration_replaces_id_in_place() {
        let mut tests = registry(&["pkg.TestA", "pkg.TestB"]);
        tests.add("exec:new".to_string(), TestDetails::new("pkg.TestA"));

        assert_eq!(tests.len(), 2);
        assert_eq!(tests.executable_id("pkg.TestA").map(String::as_str), Some("exec:new"));
        assert_eq!(tests.test_list()[0].uniform_path, "pkg.TestA");
    }

    #[test]
    fn test_impacted_list_json() {
        let json = r#"[{"uniformPath": "pkg.TestA", "selectionReason": "changed"}, {"uniformPath": "pkg.TestB"}]"#;
        let impacted: Vec<ImpactedTest> = serde_json::from_str(json).unwrap();

        assert_eq!(impacted[0], ImpactedTest::new("pkg.TestA", "changed"));
        assert_eq!(impacted[1].selection_reason, None);
    }
}
