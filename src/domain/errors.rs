//! Domain errors for the coverage relay.
//!
//! None of these are fatal to the hosting process: the pipeline turns each of
//! them into a skipped cycle, a fallback or a diagnostic.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure to reach or talk to the recording runtime.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Recording runtime is not running: {0}")]
    NotRunning(String),

    #[error("Connection refused by {0}")]
    ConnectionRefused(String),

    #[error("Connection to the recording runtime was lost: {0}")]
    Disconnected(String),

    #[error("No answer from the recording runtime within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected message from the recording runtime: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SourceError {
    /// Map a failed connection attempt, keeping refusals distinguishable
    pub fn from_connect(err: io::Error, address: &str) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused(address.to_string()),
            _ => Self::Io(err),
        }
    }

    /// True if the transport is gone and the session has to reconnect
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Disconnected(_) => true,
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Failure to turn a raw dump into a structured report.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Malformed execution data: {0}")]
    Malformed(String),

    #[error("Class file location {0} occurs more than once in the dump")]
    DuplicateClassFile(String),
}

/// Failure to hand a report to its destination.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Upload failed: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_refused_is_mapped() {
        let err = SourceError::from_connect(
            io::Error::from(io::ErrorKind::ConnectionRefused),
            "localhost:6300",
        );
        assert!(matches!(err, SourceError::ConnectionRefused(ref addr) if addr == "localhost:6300"));
    }

    #[test]
    fn test_connection_lost_classification() {
        assert!(SourceError::Disconnected("eof".into()).is_connection_lost());
        assert!(SourceError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_connection_lost());
        assert!(!SourceError::NotRunning("idle".into()).is_connection_lost());
        assert!(!SourceError::Timeout(Duration::from_secs(1)).is_connection_lost());
    }
}
