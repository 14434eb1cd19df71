pub mod available_tests;
pub mod commit_locator;
pub mod delayed_commit_gate;
pub mod dump_pipeline;
pub mod location_filter;
pub mod reconnecting_session;
pub mod testwise_aggregator;

#[cfg(test)]
pub(crate) mod test_support;

pub use available_tests::{AvailableTests, ImpactedTest, Resolution};
pub use commit_locator::{parse_git_properties, GitPropertiesLocator, LocatorError};
pub use delayed_commit_gate::{DelayedCommitGate, DrainSummary, TargetFactory};
pub use dump_pipeline::{CycleOutcome, DumpPipeline, ScheduledDumpLoop};
pub use location_filter::{FilterError, LocationFilter};
pub use reconnecting_session::{ReconnectPolicy, ReconnectingSession, SessionState, RECONNECT_TARGET};
pub use testwise_aggregator::{TestInfoBuilder, TestwiseCoverage, TestwiseReportBuilder};
