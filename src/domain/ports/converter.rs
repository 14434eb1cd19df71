use crate::domain::errors::ConversionError;
use crate::domain::models::{CoverageReport, RawDump};

/// Turns raw execution data into a structured coverage report.
///
/// Conversion is CPU bound and synchronous; callers move it off the async
/// runtime.
pub trait ReportConverter: Send + Sync {
    fn convert(&self, dump: &RawDump) -> Result<CoverageReport, ConversionError>;
}
