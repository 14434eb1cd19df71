//! Conversion of execution data into line coverage.
//!
//! Execution data is a JSON document listing the class files that were
//! loaded, each with the source file it was compiled from and its covered
//! and missed lines:
//!
//! ```json
//! {"classes": [{"location": "app.jar@com/foo/Bar.class",
//!               "sourceFile": "com/foo/Bar.java",
//!               "coveredLines": [3, 4], "missedLines": [7]}]}
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::errors::ConversionError;
use crate::domain::models::{
    CoverageReport, DuplicateClassFileBehavior, RawDump, SourceFileCoverage,
};
use crate::domain::ports::ReportConverter;
use crate::services::location_filter::LocationFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionData {
    #[serde(default)]
    pub classes: Vec<ClassCoverage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCoverage {
    pub location: String,
    pub source_file: String,
    #[serde(default)]
    pub covered_lines: Vec<u32>,
    #[serde(default)]
    pub missed_lines: Vec<u32>,
}

pub struct ExecutionDataConverter {
    filter: LocationFilter,
    duplicates: DuplicateClassFileBehavior,
}

impl ExecutionDataConverter {
    pub fn new(filter: LocationFilter, duplicates: DuplicateClassFileBehavior) -> Self {
        Self { filter, duplicates }
    }
}

impl ReportConverter for ExecutionDataConverter {
    fn convert(&self, dump: &RawDump) -> Result<CoverageReport, ConversionError> {
        let data: ExecutionData = serde_json::from_slice(&dump.execution_data)
            .map_err(|err| ConversionError::Malformed(err.to_string()))?;

        let mut seen = HashSet::with_capacity(data.classes.len());
        let mut files: BTreeMap<String, SourceFileCoverage> = BTreeMap::new();
        let mut filtered = 0usize;

        for class in data.classes {
            if !seen.insert(class.location.clone()) {
                match self.duplicates {
                    DuplicateClassFileBehavior::Ignore => {}
                    DuplicateClassFileBehavior::Warn => warn!(
                        location = %class.location,
                        "Class file occurs more than once in the dump, keeping the first"
                    ),
                    DuplicateClassFileBehavior::Fail => {
                        return Err(ConversionError::DuplicateClassFile(class.location));
                    }
                }
                continue;
            }

            if !self.filter.is_included(&class.location) {
                filtered += 1;
                continue;
            }

            let path = class.source_file.replace('\\', "/");
            let file = files.entry(path).or_insert_with_key(|path| {
                let (folder, file_name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
                SourceFileCoverage::new(folder, file_name)
            });
            for line in class.missed_lines {
                file.record(line, false);
            }
            for line in class.covered_lines {
                file.record(line, true);
            }
        }

        debug!(
            session_id = %dump.session_id,
            files = files.len(),
            filtered_classes = filtered,
            "Converted execution data"
        );
        Ok(CoverageReport::new(
            dump.session_id.clone(),
            dump.captured_at,
            files.into_values().collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dump(classes: serde_json::Value) -> RawDump {
        RawDump::new("Unit Tests", serde_json::to_vec(&json!({ "classes": classes })).unwrap())
    }

    fn converter(includes: &str, duplicates: DuplicateClassFileBehavior) -> ExecutionDataConverter {
        ExecutionDataConverter::new(LocationFilter::parse(includes, "").unwrap(), duplicates)
    }

    #[test]
    fn test_classes_of_one_source_file_are_merged() {
        let report = converter("", DuplicateClassFileBehavior::Warn)
            .convert(&dump(json!([
                {"location": "app.jar@com/foo/Bar.class", "sourceFile": "com/foo/Bar.java",
                 "coveredLines": [3], "missedLines": [7]},
                {"location": "app.jar@com/foo/Bar$Inner.class", "sourceFile": "com/foo/Bar.java",
                 "coveredLines": [7, 9]},
                {"location": "app.jar@Main.class", "sourceFile": "Main.java", "missedLines": [1]}
            ])))
            .unwrap();

        assert_eq!(report.partition(), "Unit Tests");
        assert_eq!(report.files().len(), 2);
        let bar = report.files().iter().find(|f| f.file_name == "Bar.java").unwrap();
        assert_eq!(bar.folder, "com/foo");
        assert_eq!(bar.covered_lines().collect::<Vec<_>>(), vec![3, 7, 9]);
        assert_eq!(report.covered_line_count(), 3);
    }

    #[test]
    fn test_excluded_locations_are_dropped() {
        let report = converter("com.*", DuplicateClassFileBehavior::Warn)
            .convert(&dump(json!([
                {"location": "app.jar@com/foo/Bar.class", "sourceFile": "com/foo/Bar.java", "coveredLines": [1]},
                {"location": "lib.jar@org/dep/Util.class", "sourceFile": "org/dep/Util.java", "coveredLines": [1]}
            ])))
            .unwrap();

        assert_eq!(report.files().len(), 1);
        assert_eq!(report.files()[0].file_name, "Bar.java");
    }

    #[test]
    fn test_duplicate_class_files() {
        let classes = json!([
            {"location": "app.jar@com/foo/Bar.class", "sourceFile": "com/foo/Bar.java", "coveredLines": [1]},
            {"location": "app.jar@com/foo/Bar.class", "sourceFile": "com/foo/Bar.java", "coveredLines": [2]}
        ]);

        let report = converter("", DuplicateClassFileBehavior::Ignore)
            .convert(&dump(classes.clone()))
            .unwrap();
        assert_eq!(report.covered_line_count(), 1);

        let err = converter("", DuplicateClassFileBehavior::Fail)
            .convert(&dump(classes))
            .unwrap_err();
        assert!(matches!(err, ConversionError::DuplicateClassFile(ref l) if l == "app.jar@com/foo/Bar.class"));
    }

    #[test]
    fn test_malformed_data() {
        let err = converter("", DuplicateClassFileBehavior::Warn)
            .convert(&RawDump::new("", b"not json".to_vec()))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Malformed(_)));
    }
}
