//! Coverage relay
//!
//! Collects coverage counter dumps from instrumented processes, converts
//! them into structured reports and delivers them to a local directory or a
//! collection endpoint, caching reports until the commit they belong to is
//! known.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports the services depend on
//! - **Service Layer** (`services`): dump pipeline, reconnecting session, commit gate,
//!   testwise aggregation and impacted test resolution
//! - **Infrastructure Layer** (`infrastructure`): config, logging, transports, delivery
//!   targets, the report converter and the control server
//! - **Application Layer** (`application`): the agent and watcher run modes
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use coverage_relay::{Agent, ConfigLoader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load(None)?;
//!     let agent = Agent::start(&config, Arc::new(my_source())).await?;
//!     tokio::signal::ctrl_c().await?;
//!     agent.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Agent, Delivery, Watcher};
pub use domain::errors::{ConversionError, DeliveryError, SourceError};
pub use domain::models::{
    CommitDescriptor, Config, CoverageReport, RawDump, TestwiseCoverageReport,
};
pub use domain::ports::{DeliveryTarget, DumpSourceConnector, RawDumpSource, ReportConverter};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AvailableTests, CycleOutcome, DelayedCommitGate, DumpPipeline, LocationFilter,
    ReconnectingSession, ScheduledDumpLoop, TestwiseCoverage, TestwiseReportBuilder,
};
