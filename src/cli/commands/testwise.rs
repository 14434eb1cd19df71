//! Implementation of the `coverage-relay testwise` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{TestDetails, TestExecution, TestwiseCoverageReport};
use crate::infrastructure::closure::ClosureCoverageReader;
use crate::services::location_filter::LocationFilter;
use crate::services::testwise_aggregator::TestwiseReportBuilder;

#[derive(Args, Debug)]
pub struct TestwiseArgs {
    /// Coverage files, or directories searched recursively for `*.json`
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Where to write the report
    #[arg(short, long)]
    pub output: PathBuf,

    /// `;`-separated include patterns over covered file paths, `/` and `.` both separate segments (`src/*` equals `src.*`)
    #[arg(long, default_value = "")]
    pub includes: String,

    /// `;`-separated exclude patterns over covered file paths, written like the include patterns
    #[arg(long, default_value = "")]
    pub excludes: String,

    /// JSON list of test details to join into the report
    #[arg(long)]
    pub test_details: Option<PathBuf>,

    /// JSON list of test executions to join into the report
    #[arg(long)]
    pub test_executions: Option<PathBuf>,

    /// Only a subset of all tests was executed
    #[arg(long)]
    pub partial: bool,

    /// Leave out tests without recorded coverage
    #[arg(long)]
    pub skip_empty: bool,
}

#[derive(Debug, Serialize)]
pub struct TestwiseOutput {
    pub output: PathBuf,
    pub tests: usize,
    pub tests_with_coverage: usize,
    pub partial: bool,
}

impl CommandOutput for TestwiseOutput {
    fn to_human(&self) -> String {
        format!(
            "Wrote testwise coverage of {} test(s), {} with coverage, to {}",
            self.tests,
            self.tests_with_coverage,
            self.output.display()
        )
    }
}

async fn read_json_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn build_report(args: &TestwiseArgs) -> Result<TestwiseCoverageReport> {
    let filter = LocationFilter::parse(&args.includes, &args.excludes)
        .context("Invalid include/exclude patterns")?;
    let reader = ClosureCoverageReader::new(args.inputs.clone(), filter);
    let coverage = tokio::task::spawn_blocking(move || reader.read_test_coverage())
        .await
        .context("Reading coverage files aborted")?;

    let mut builder = TestwiseReportBuilder::new()
        .partial(args.partial)
        .skip_tests_without_coverage(args.skip_empty);
    if let Some(path) = &args.test_details {
        builder.add_test_details(read_json_list::<TestDetails>(path).await?);
    }
    if let Some(path) = &args.test_executions {
        builder.add_test_executions(read_json_list::<TestExecution>(path).await?);
    }
    builder.add_coverage(coverage);
    Ok(builder.build())
}

pub async fn execute(args: TestwiseArgs, json_mode: bool) -> Result<()> {
    let report = build_report(&args).await?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string(&report).context("Failed to serialize report")?;
    fs::write(&args.output, json)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let summary = TestwiseOutput {
        output: args.output,
        tests: report.tests.len(),
        tests_with_coverage: report.tests.iter().filter(|t| !t.paths.is_empty()).count(),
        partial: report.partial,
    };
    output(&summary, json_mode);
    Ok(())
}
