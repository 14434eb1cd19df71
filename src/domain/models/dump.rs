use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of execution counters taken by an atomic dump-and-reset.
///
/// The counters in the instrumented process are cleared when the snapshot is
/// taken, so a dump whose conversion fails cannot be requested again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDump {
    /// Session label (partition) active in the recording runtime
    pub session_id: String,

    /// Time at which the snapshot was captured
    pub captured_at: DateTime<Utc>,

    /// Opaque execution data as produced by the recording runtime
    #[serde(default)]
    pub execution_data: Vec<u8>,
}

impl RawDump {
    /// Create a dump captured now
    pub fn new(session_id: impl Into<String>, execution_data: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            captured_at: Utc::now(),
            execution_data,
        }
    }

    /// Capture time in milliseconds since the epoch
    pub fn capture_millis(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }
}
