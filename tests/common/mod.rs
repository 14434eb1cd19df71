//! Common test utilities for integration tests
//!
//! Provides shared fixtures and a fake recording runtime speaking the
//! newline-delimited JSON protocol over a loopback TCP listener.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Wait for a condition to be true with timeout
#[allow(dead_code)]
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Execution data covering `line` of `com/foo/Bar.java`
#[allow(dead_code)]
pub fn execution_data(line: u32) -> Value {
    json!({"classes": [{
        "location": "app.jar@com/foo/Bar.class",
        "sourceFile": "com/foo/Bar.java",
        "coveredLines": [line],
        "missedLines": [line + 1]
    }]})
}

/// Loopback recording runtime.
///
/// Every accepted connection answers `dumps_per_connection` dump requests and
/// is then closed by the runtime.
#[allow(dead_code)]
pub struct FakeRuntime {
    pub port: u16,
    pub sessions: Arc<Mutex<Vec<String>>>,
    pub connections: Arc<Mutex<usize>>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl FakeRuntime {
    pub async fn start(dumps_per_connection: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake runtime");
        let port = listener.local_addr().expect("no local address").port();
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));

        let handle = {
            let sessions = Arc::clone(&sessions);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    *connections.lock().unwrap() += 1;
                    let sessions = Arc::clone(&sessions);
                    tokio::spawn(async move {
                        let (read_half, mut write_half) = stream.into_split();
                        let mut lines = BufReader::new(read_half).lines();
                        let mut session = String::new();
                        let mut served = 0;
                        while let Ok(Some(line)) = lines.next_line().await {
                            let command: Value = serde_json::from_str(&line).unwrap();
                            match command["command"].as_str() {
                                Some("session") => {
                                    session = command["id"].as_str().unwrap_or_default().to_string();
                                    sessions.lock().unwrap().push(session.clone());
                                }
                                Some("dump") => {
                                    served += 1;
                                    let frame = json!({
                                        "type": "dump",
                                        "sessionId": session,
                                        "timestampMillis": 1_700_000_000_000_i64 + served as i64,
                                        "executionData": execution_data(served as u32),
                                    });
                                    let mut bytes = frame.to_string().into_bytes();
                                    bytes.push(b'\n');
                                    if write_half.write_all(&bytes).await.is_err() {
                                        break;
                                    }
                                    if served >= dumps_per_connection {
                                        break;
                                    }
                                }
                                _ => {}
                            }
                        }
                    });
                }
            })
        };

        Self {
            port,
            sessions,
            connections,
            handle,
        }
    }

    pub fn connection_count(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

impl Drop for FakeRuntime {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
