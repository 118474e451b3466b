//! Append-only structured event log.
//!
//! One JSON object per line; every line parses independently, so consumers
//! can tail the file without any framing beyond newlines. The core never
//! rewrites or removes entries; rotation is an external concern.

use crate::error::{Result, WardenError};
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "INFO"),
            EventLevel::Warn => write!(f, "WARN"),
            EventLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One event log entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: String,
    pub level: EventLevel,
    pub component: String,
    pub message: String,
}

impl EventRecord {
    /// Messages are flattened to a single line to keep the log line-delimited.
    pub fn new(
        now: DateTime<Utc>,
        level: EventLevel,
        component: &str,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into().replace(['\n', '\r'], " ");
        Self {
            timestamp: now.to_rfc3339(),
            level,
            component: component.to_string(),
            message,
        }
    }

    pub fn info(now: DateTime<Utc>, component: &str, message: impl Into<String>) -> Self {
        Self::new(now, EventLevel::Info, component, message)
    }

    pub fn warn(now: DateTime<Utc>, component: &str, message: impl Into<String>) -> Self {
        Self::new(now, EventLevel::Warn, component, message)
    }

    pub fn error(now: DateTime<Utc>, component: &str, message: impl Into<String>) -> Self {
        Self::new(now, EventLevel::Error, component, message)
    }
}

/// Append-only JSONL sink backed by a single file.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Appends one record. Failure here is surfaced to the caller; a
    /// supervisor that cannot record what it does must not keep going.
    pub fn append(&self, record: &EventRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|err| WardenError::json("serialize event", err))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| WardenError::io("open event log", err))?;
        writeln!(file, "{}", line).map_err(|err| WardenError::io("append event", err))?;
        file.flush().map_err(|err| WardenError::io("flush event log", err))
    }

    pub fn append_all(&self, records: &[EventRecord]) -> Result<()> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }

    /// Returns the last `n` parseable entries, oldest first. Best-effort: a
    /// missing file is an empty log, unparseable lines are skipped.
    pub fn tail(&self, n: usize) -> Vec<EventRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        let mut entries: Vec<EventRecord> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if entries.len() > n {
            entries.drain(..entries.len() - n);
        }
        entries
    }
}
