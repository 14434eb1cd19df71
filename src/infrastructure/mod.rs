//! Infrastructure layer module
//!
//! This module contains the adapters to the outside world:
//! - Configuration management
//! - Logging infrastructure
//! - Delivery targets (local directory, collection server)
//! - Execution data conversion
//! - Transport to recording runtimes
//! - HTTP control surface
//! - Closure coverage files
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod closure;
pub mod config;
pub mod converter;
pub mod delivery;
pub mod http;
pub mod logging;
pub mod transport;
