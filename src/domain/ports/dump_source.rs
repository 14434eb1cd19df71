use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::SourceError;
use crate::domain::models::RawDump;

/// Recording runtime that can hand out its execution counters.
///
/// Implementations may live in-process or behind a transport.
#[async_trait]
pub trait RawDumpSource: Send + Sync {
    /// Atomically snapshot and clear the execution counters
    async fn snapshot_and_reset(&self) -> Result<RawDump, SourceError>;

    /// Discard the current counters without producing a dump
    async fn reset(&self) -> Result<(), SourceError>;

    /// Change the session label attached to subsequent dumps
    async fn set_session_id(&self, session_id: &str) -> Result<(), SourceError>;

    /// Release the underlying transport, if any
    async fn close(&self) {}

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// An open connection to a recording runtime.
pub struct Connection {
    pub source: Arc<dyn RawDumpSource>,

    /// Cancelled once the remote side closes the transport
    pub closed: CancellationToken,
}

/// Opens connections to a recording runtime reached over a transport.
#[async_trait]
pub trait DumpSourceConnector: Send + Sync {
    async fn connect(&self) -> Result<Connection, SourceError>;

    fn describe(&self) -> String;
}
