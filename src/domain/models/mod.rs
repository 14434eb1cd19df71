pub mod commit;
pub mod config;
pub mod dump;
pub mod report;
pub mod testwise;

pub use commit::{CommitDescriptor, CommitParseError};
pub use config::{
    BackoffStrategy, Config, DuplicateClassFileBehavior, HttpServerConfig, LoggingConfig,
    RemoteServerConfig, SourceConfig, UploadConfig,
};
pub use dump::RawDump;
pub use report::{CoverageReport, SourceFileCoverage};
pub use testwise::{
    FileCoverage, FileCoverageBuilder, PathCoverage, TestCoverageBuilder, TestDetails,
    TestExecution, TestInfo, TestOutcome, TestwiseCoverageReport,
};
