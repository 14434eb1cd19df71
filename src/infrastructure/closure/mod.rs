//! Testwise coverage recorded by Google Closure

pub mod reader;

pub use reader::ClosureCoverageReader;
