// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle and output sinks

use super::{Facility, Severity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// One formatted log record.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub when: DateTime<Utc>,
    pub severity: Severity,
    pub facility: Facility,
    pub message: String,
}

impl LogEntry {
    fn new(severity: Severity, facility: Facility, message: &str) -> Self {
        Self {
            when: Utc::now(),
            severity,
            facility,
            message: message.to_string(),
        }
    }
}

/// Output destination for log entries.
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &LogEntry);
}

/// Plain-text sink writing one line per entry to stderr.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, entry: &LogEntry) {
        eprintln!(
            "{} {} [{}] {}",
            entry.when.to_rfc3339(),
            entry.severity,
            entry.facility,
            entry.message
        );
        // No flush() - let stderr buffer naturally
    }
}

/// In-memory sink for tests: records every entry for later assertions.
#[derive(Default)]
pub struct CaptureSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Count of captured entries at or above the given severity.
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.severity <= severity)
            .count()
    }
}

impl LogSink for CaptureSink {
    fn write(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Logger handle for writing log entries
///
/// This is a lightweight handle that can be cloned and passed around.
/// The actual sink is shared via Arc.
pub struct Logger {
    sink: Arc<dyn LogSink>,
    /// Global minimum log level (default: Info)
    global_min_level: Arc<AtomicU8>,
    /// Per-facility minimum log levels
    facility_min_levels: Arc<RwLock<HashMap<Facility, Severity>>>,
}

impl Logger {
    /// Create a logger writing plain text to stderr.
    pub fn stderr() -> Self {
        Self::with_sink(Arc::new(StderrSink))
    }

    /// Create a logger over an arbitrary sink (tests use `CaptureSink`).
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            global_min_level: Arc::new(AtomicU8::new(Severity::Info as u8)),
            facility_min_levels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[inline]
    fn should_log(&self, severity: Severity, facility: Facility) -> bool {
        // Facility-specific level, if set, overrides the global minimum
        let levels = self.facility_min_levels.read().unwrap();
        if let Some(&min_level) = levels.get(&facility) {
            return severity <= min_level;
        }
        drop(levels);

        let global_min = self.global_min_level.load(Ordering::Relaxed);
        (severity as u8) <= global_min
    }

    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if !self.should_log(severity, facility) {
            return;
        }
        self.sink.write(&LogEntry::new(severity, facility, message));
    }

    #[inline]
    pub fn emergency(&self, facility: Facility, message: &str) {
        self.log(Severity::Emergency, facility, message);
    }

    #[inline]
    pub fn alert(&self, facility: Facility, message: &str) {
        self.log(Severity::Alert, facility, message);
    }

    #[inline]
    pub fn critical(&self, facility: Facility, message: &str) {
        self.log(Severity::Critical, facility, message);
    }

    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    #[inline]
    pub fn notice(&self, facility: Facility, message: &str) {
        self.log(Severity::Notice, facility, message);
    }

    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }

    /// Set the global minimum log level
    pub fn set_global_level(&self, level: Severity) {
        self.global_min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Set the minimum log level for a specific facility
    pub fn set_facility_level(&self, facility: Facility, level: Severity) {
        self.facility_min_levels
            .write()
            .unwrap()
            .insert(facility, level);
    }

    /// Clear the facility-specific log level (fall back to global)
    pub fn clear_facility_level(&self, facility: Facility) {
        self.facility_min_levels.write().unwrap().remove(&facility);
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            global_min_level: Arc::clone(&self.global_min_level),
            facility_min_levels: Arc::clone(&self.facility_min_levels),
        }
    }
}
