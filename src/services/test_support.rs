//! Test doubles shared by the service unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::{ConversionError, SourceError};
use crate::domain::models::{CoverageReport, RawDump, SourceFileCoverage};
use crate::domain::ports::{DeliveryTarget, RawDumpSource, ReportConverter};

/// Source that replays queued results, then hands out empty dumps.
#[derive(Default)]
pub struct ScriptedSource {
    results: Mutex<VecDeque<Result<RawDump, SourceError>>>,
    pub snapshots: AtomicUsize,
    pub resets: AtomicUsize,
    pub sessions: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(results: Vec<Result<RawDump, SourceError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawDumpSource for ScriptedSource {
    async fn snapshot_and_reset(&self) -> Result<RawDump, SourceError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawDump::new("", b"src/a.js:1".to_vec())))
    }

    async fn reset(&self) -> Result<(), SourceError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_session_id(&self, session_id: &str) -> Result<(), SourceError> {
        self.sessions.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted source".to_string()
    }
}

/// Converter reading `path:line,line` from the execution data.
///
/// Execution data `bad` fails the conversion and `panic` panics.
pub struct LineListConverter;

impl ReportConverter for LineListConverter {
    fn convert(&self, dump: &RawDump) -> Result<CoverageReport, ConversionError> {
        let text = String::from_utf8_lossy(&dump.execution_data);
        match text.as_ref() {
            "bad" => return Err(ConversionError::Malformed("bad data".to_string())),
            "panic" => panic!("converter blew up"),
            _ => {}
        }
        let (path, lines) = text
            .split_once(':')
            .ok_or_else(|| ConversionError::Malformed(text.to_string()))?;
        let (folder, file_name) = path.rsplit_once('/').unwrap_or(("", path));
        let mut file = SourceFileCoverage::new(folder, file_name);
        for line in lines.split(',').filter_map(|l| l.parse().ok()) {
            file.record(line, true);
        }
        Ok(CoverageReport::new(
            dump.session_id.clone(),
            dump.captured_at,
            vec![file],
        ))
    }
}

/// Target that keeps every report it accepts.
pub struct RecordingTarget {
    pub reports: Mutex<Vec<CoverageReport>>,
    accept: AtomicBool,
    pub shutdowns: AtomicUsize,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        let target = Self::new();
        target.accept.store(false, Ordering::SeqCst);
        target
    }

    pub fn set_accepting(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<CoverageReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryTarget for RecordingTarget {
    async fn deliver(&self, report: &CoverageReport) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.reports.lock().unwrap().push(report.clone());
        true
    }

    fn describe(&self) -> String {
        "recording target".to_string()
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Report with a single covered line, captured at `millis`.
pub fn report_at(millis: i64, partition: &str) -> CoverageReport {
    let captured_at = chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
    let mut file = SourceFileCoverage::new("src", "a.js");
    file.record(1, true);
    CoverageReport::new(partition, captured_at, vec![file])
}
