//! Delivery targets for converted coverage reports

pub mod file_cache;
pub mod remote;

pub use file_cache::LocalFileCache;
pub use remote::ImmediateRemote;
