//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::{AgentArgs, ImpactedArgs, TestwiseArgs, WatchArgs};

#[derive(Parser)]
#[command(name = "coverage-relay")]
#[command(about = "Collects coverage dumps and delivers them to a collection endpoint", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to coverage-relay.yaml in the working directory)
    #[arg(short, long, global = true, env = "COVERAGE_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dump the local runtime on a timer and serve the control endpoints
    Agent(AgentArgs),

    /// Keep a session to a remote runtime alive and dump it periodically
    Watch(WatchArgs),

    /// Aggregate per-test coverage files into a testwise report
    Testwise(TestwiseArgs),

    /// Map impacted tests to the executable ids of the available tests
    Impacted(ImpactedArgs),
}
