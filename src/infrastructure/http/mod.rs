//! HTTP control surface

pub mod control_server;

pub use control_server::ControlServer;
