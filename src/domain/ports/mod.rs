//! Ports to the collaborators of the coverage pipeline.

pub mod converter;
pub mod delivery;
pub mod dump_source;

pub use converter::ReportConverter;
pub use delivery::DeliveryTarget;
pub use dump_source::{Connection, DumpSourceConnector, RawDumpSource};
