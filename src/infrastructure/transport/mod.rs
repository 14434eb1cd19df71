//! Transports to recording runtimes

pub mod tcp;

pub use tcp::{OnDemandDumpSource, TcpDumpConnector, TcpDumpSource};
