//! Application layer: wires services and infrastructure into the two ways
//! of running the relay.

pub mod agent;
pub mod delivery;
pub mod watcher;

pub use agent::Agent;
pub use delivery::{Delivery, PENDING_COMMIT_DIR, UPLOAD_FAILED_DIR};
pub use watcher::Watcher;
