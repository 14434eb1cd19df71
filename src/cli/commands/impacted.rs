//! Implementation of the `coverage-relay impacted` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::TestDetails;
use crate::services::available_tests::{AvailableTests, ImpactedTest, Resolution};

#[derive(Args, Debug)]
pub struct ImpactedArgs {
    /// JSON list of locally executable tests
    #[arg(long)]
    pub available: PathBuf,

    /// JSON list of impacted tests selected by the impact analysis
    #[arg(long)]
    pub impacted: PathBuf,
}

/// Entry of the available-tests list: test details plus the id the local
/// engine runs it by. Tests without an id run by their uniform path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailableTestEntry {
    #[serde(default)]
    executable_id: Option<String>,
    #[serde(flatten)]
    details: TestDetails,
}

#[derive(Debug, Serialize)]
pub struct ImpactedOutput {
    pub executable_ids: Vec<String>,
    /// Unknown uniform path that caused all tests to be selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_cause: Option<String>,
}

impl CommandOutput for ImpactedOutput {
    fn to_human(&self) -> String {
        self.executable_ids.join("\n")
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn resolve(args: &ImpactedArgs) -> Result<ImpactedOutput> {
    let entries: Vec<AvailableTestEntry> = read_json(&args.available).await?;
    let impacted: Vec<ImpactedTest> = read_json(&args.impacted).await?;

    let mut available = AvailableTests::new();
    for entry in entries {
        let id = entry
            .executable_id
            .unwrap_or_else(|| entry.details.uniform_path.clone());
        available.add(id, entry.details);
    }

    Ok(match available.resolve_impacted(&impacted) {
        Resolution::Selected(executable_ids) => ImpactedOutput {
            executable_ids,
            fallback_cause: None,
        },
        Resolution::FallbackToAll { unknown, all } => ImpactedOutput {
            executable_ids: all,
            fallback_cause: Some(unknown),
        },
    })
}

pub async fn execute(args: ImpactedArgs, json_mode: bool) -> Result<()> {
    let result = resolve(&args).await?;
    output(&result, json_mode);
    Ok(())
}
