//! Newline-delimited JSON protocol to a recording runtime over TCP.
//!
//! The agent sends commands (`{"command":"dump","reset":true}`,
//! `{"command":"reset"}`, `{"command":"session","id":"..."}`). The runtime
//! answers a dump with a `{"type":"dump",...}` frame, or with
//! `{"type":"error","message":"..."}` when it cannot produce one. A reader
//! task parses incoming frames into a bounded channel and cancels the
//! connection's `closed` token once the runtime goes away.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::SourceError;
use crate::domain::models::{RawDump, SourceConfig};
use crate::domain::ports::{Connection, DumpSourceConnector, RawDumpSource};

const FRAME_BUFFER: usize = 4;

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum Command {
    Dump { reset: bool },
    Reset,
    Session { id: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Frame {
    Dump {
        #[serde(rename = "sessionId", default)]
        session_id: String,
        #[serde(rename = "timestampMillis", default)]
        timestamp_millis: Option<i64>,
        #[serde(rename = "executionData")]
        execution_data: serde_json::Value,
    },
    Error {
        message: String,
    },
}

/// One open connection to a recording runtime.
pub struct TcpDumpSource {
    address: String,
    writer: Mutex<Option<OwnedWriteHalf>>,
    frames: Mutex<mpsc::Receiver<Frame>>,
    dump_timeout: Duration,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TcpDumpSource {
    /// Take over `stream`, returning the source and its `closed` token
    pub fn from_stream(
        stream: TcpStream,
        address: String,
        dump_timeout: Duration,
    ) -> (Self, CancellationToken) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let closed = CancellationToken::new();
        let reader = tokio::spawn(read_frames(
            read_half,
            tx,
            closed.clone(),
            address.clone(),
        ));

        let source = Self {
            address,
            writer: Mutex::new(Some(write_half)),
            frames: Mutex::new(rx),
            dump_timeout,
            reader: std::sync::Mutex::new(Some(reader)),
        };
        (source, closed)
    }

    async fn send(&self, command: &Command) -> Result<(), SourceError> {
        let mut line = serde_json::to_vec(command)
            .map_err(|err| SourceError::Protocol(err.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| SourceError::Disconnected(format!("{} is closed", self.address)))?;
        stream.write_all(&line).await?;
        stream.flush().await?;
        Ok(())
    }
}

async fn read_frames(
    read_half: OwnedReadHalf,
    tx: mpsc::Sender<Frame>,
    closed: CancellationToken,
    address: String,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<Frame>(&line) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, address = %address, "Ignoring unreadable frame"),
            },
            Ok(None) => {
                debug!(address = %address, "Recording runtime closed the connection");
                break;
            }
            Err(err) => {
                warn!(error = %err, address = %address, "Reading from the recording runtime failed");
                break;
            }
        }
    }
    closed.cancel();
}

#[async_trait]
impl RawDumpSource for TcpDumpSource {
    async fn snapshot_and_reset(&self) -> Result<RawDump, SourceError> {
        // one request in flight at a time
        let mut frames = self.frames.lock().await;
        while let Ok(stale) = frames.try_recv() {
            match stale {
                Frame::Dump { session_id, .. } => warn!(
                    session_id = %session_id,
                    address = %self.address,
                    "Discarding dump that arrived after its request timed out, its coverage is lost"
                ),
                Frame::Error { message } => {
                    debug!(message = %message, address = %self.address, "Discarding late error frame");
                }
            }
        }

        self.send(&Command::Dump { reset: true }).await?;

        let frame = tokio::time::timeout(self.dump_timeout, frames.recv())
            .await
            .map_err(|_| SourceError::Timeout(self.dump_timeout))?
            .ok_or_else(|| {
                SourceError::Disconnected(format!("{} closed the connection", self.address))
            })?;

        match frame {
            Frame::Dump {
                session_id,
                timestamp_millis,
                execution_data,
            } => {
                let captured_at = timestamp_millis
                    .and_then(DateTime::from_timestamp_millis)
                    .unwrap_or_else(Utc::now);
                let execution_data = serde_json::to_vec(&execution_data)
                    .map_err(|err| SourceError::Protocol(err.to_string()))?;
                Ok(RawDump {
                    session_id,
                    captured_at,
                    execution_data,
                })
            }
            Frame::Error { message } => Err(SourceError::NotRunning(message)),
        }
    }

    async fn reset(&self) -> Result<(), SourceError> {
        self.send(&Command::Reset).await
    }

    async fn set_session_id(&self, session_id: &str) -> Result<(), SourceError> {
        self.send(&Command::Session {
            id: session_id.to_string(),
        })
        .await
    }

    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let reader = self.reader.lock().ok().and_then(|mut r| r.take());
        if let Some(reader) = reader {
            reader.abort();
        }
    }

    fn describe(&self) -> String {
        format!("recording runtime at {}", self.address)
    }
}

/// Connects to a recording runtime listening on a TCP port.
#[derive(Debug, Clone)]
pub struct TcpDumpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    dump_timeout: Duration,
}

impl TcpDumpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let defaults = SourceConfig::default();
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(defaults.connect_timeout_secs),
            dump_timeout: Duration::from_secs(defaults.dump_timeout_secs),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout: Duration, dump_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.dump_timeout = dump_timeout;
        self
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&SourceConfig> for TcpDumpConnector {
    fn from(config: &SourceConfig) -> Self {
        Self::new(config.host.clone(), config.port).with_timeouts(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.dump_timeout_secs),
        )
    }
}

#[async_trait]
impl DumpSourceConnector for TcpDumpConnector {
    async fn connect(&self) -> Result<Connection, SourceError> {
        let address = self.address();
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| SourceError::Timeout(self.connect_timeout))?
        .map_err(|err| SourceError::from_connect(err, &address))?;
        stream.set_nodelay(true)?;

        let (source, closed) = TcpDumpSource::from_stream(stream, address, self.dump_timeout);
        Ok(Connection {
            source: Arc::new(source),
            closed,
        })
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address())
    }
}

/// Source that connects when it is first used and again after the
/// connection was lost.
///
/// The last session label is sent again on every new connection.
pub struct OnDemandDumpSource {
    connector: Arc<dyn DumpSourceConnector>,
    current: Mutex<Option<Connection>>,
    session_id: Mutex<Option<String>>,
}

impl OnDemandDumpSource {
    pub fn new(connector: Arc<dyn DumpSourceConnector>) -> Self {
        Self {
            connector,
            current: Mutex::new(None),
            session_id: Mutex::new(None),
        }
    }

    /// Current source, connecting first if needed. The flag is true for a
    /// fresh connection.
    async fn source(&self) -> Result<(Arc<dyn RawDumpSource>, bool), SourceError> {
        let mut current = self.current.lock().await;
        if let Some(connection) = current.as_ref() {
            if !connection.closed.is_cancelled() {
                return Ok((Arc::clone(&connection.source), false));
            }
            connection.source.close().await;
        }

        let connection = self
            .connector
            .connect()
            .await
            .map_err(|err| match err {
                SourceError::ConnectionRefused(address) => {
                    SourceError::NotRunning(format!("nothing listening on {address}"))
                }
                other => other,
            })?;
        info!(source = %connection.source.describe(), "Connected to recording runtime");

        if let Some(session_id) = self.session_id.lock().await.as_deref() {
            connection.source.set_session_id(session_id).await?;
        }
        let source = Arc::clone(&connection.source);
        *current = Some(connection);
        Ok((source, true))
    }

    async fn forget_if_lost<T>(&self, result: Result<T, SourceError>) -> Result<T, SourceError> {
        if let Err(err) = &result {
            if err.is_connection_lost() {
                if let Some(connection) = self.current.lock().await.take() {
                    connection.source.close().await;
                }
            }
        }
        result
    }
}

#[async_trait]
impl RawDumpSource for OnDemandDumpSource {
    async fn snapshot_and_reset(&self) -> Result<RawDump, SourceError> {
        let (source, _) = self.source().await?;
        let result = source.snapshot_and_reset().await;
        self.forget_if_lost(result).await
    }

    async fn reset(&self) -> Result<(), SourceError> {
        let (source, _) = self.source().await?;
        let result = source.reset().await;
        self.forget_if_lost(result).await
    }

    async fn set_session_id(&self, session_id: &str) -> Result<(), SourceError> {
        *self.session_id.lock().await = Some(session_id.to_string());
        let (source, fresh) = self.source().await?;
        if fresh {
            // already sent while connecting
            return Ok(());
        }
        let result = source.set_session_id(session_id).await;
        self.forget_if_lost(result).await
    }

    async fn close(&self) {
        if let Some(connection) = self.current.lock().await.take() {
            connection.source.close().await;
        }
    }

    fn describe(&self) -> String {
        format!("recording runtime at {} (connected on demand)", self.connector.describe())
    }
}
