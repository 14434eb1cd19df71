//! Domain layer for the coverage relay
//!
//! This module contains the coverage models, the error taxonomy and the ports
//! implemented by the infrastructure layer.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ConversionError, DeliveryError, SourceError};
