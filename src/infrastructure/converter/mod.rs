//! Conversion of raw dumps into coverage reports

pub mod execution_data;

pub use execution_data::{ClassCoverage, ExecutionData, ExecutionDataConverter};
