//! Per-worker event log
//!
//! Every worker appends `<unix-timestamp>:<message>` lines to its own log
//! file. Writing never fails from the caller's point of view: I/O errors
//! are reported on stderr and otherwise dropped so that a full disk cannot
//! stop a build.

use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Sink for the worker's job lifecycle events
pub trait EventLog: Send + Sync {
    /// Appends one message
    fn log(&self, message: &str);
}

/// Formats a log line for the given instant
pub fn format_line(at: DateTime<Utc>, message: &str) -> String {
    format!(
        "{}.{:06}:{}\n",
        at.timestamp(),
        at.timestamp_subsec_micros(),
        message
    )
}

/// Append-only event log file for one worker
pub struct FileEventLog {
    worker: usize,
    path: PathBuf,
    /// Serialises writes so lines from one worker never interleave
    lock: Mutex<()>,
}

impl FileEventLog {
    pub fn new(worker: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            worker,
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl EventLog for FileEventLog {
    fn log(&self, message: &str) {
        debug!(worker = self.worker, "{}", message);

        let line = format_line(Utc::now(), message);
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Err(e) = self.append(&line) {
            eprintln!(
                "Could not write to logfile {} - {}",
                self.path.display(),
                e
            );
        }
    }
}

/// In-memory event log
///
/// Keeps formatted lines so tests can inspect what a worker reported.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryEventLog {
    lines: std::sync::Arc<Mutex<Vec<String>>>,
}

#[cfg(test)]
impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages logged so far, without timestamps
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|line| line.split_once(':').map(|(_, m)| m.trim_end().to_string()))
            .collect()
    }

    /// Whether any message contains the given text
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
impl EventLog for MemoryEventLog {
    fn log(&self, message: &str) {
        let line = format_line(Utc::now(), message);
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }
}
