//! Durable supervisor state: the counter/version record and the handoff
//! debounce table.
//!
//! Both files are read-modify-written by the single supervisor process and
//! persisted atomically (write to `.tmp`, then rename). Timestamps are
//! stored as RFC3339 strings.

use crate::error::{Result, WardenError};
use chrono::{DateTime, Duration, Utc};
use fs_err as fs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The single durable record of counters and upstream version knowledge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentState {
    pub last_known_release: String,
    pub last_known_commit: String,
    pub last_check_ts: Option<String>,
    pub last_upgrade_ts: Option<String>,
    pub last_analysis_ts: Option<String>,
    pub cycles_run: u64,
    pub upgrades_applied: u64,
    pub handoffs_triggered: u64,
    pub ai_analyses_run: u64,
}

impl PersistentState {
    /// Loads the state record. A missing file yields defaults; a present but
    /// unreadable file is an error so the caller can decide to reset with a
    /// warning.
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path, |details| WardenError::StateMalformed {
            path: path.to_path_buf(),
            details,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    /// Records an externally-applied upgrade. Version fields only ever
    /// advance through this path.
    pub fn record_upgrade(&mut self, tag: &str, commit: &str, now: DateTime<Utc>) {
        self.last_known_release = tag.to_string();
        self.last_known_commit = commit.to_string();
        self.last_upgrade_ts = Some(now.to_rfc3339());
        self.upgrades_applied += 1;
    }
}

/// Maps session name -> timestamp of the last restart issued for it.
///
/// Entries never expire on their own; a newer restart supersedes them. The
/// table is what prevents restart storms when the host's reported session
/// age resets unreliably.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebounceTable {
    entries: BTreeMap<String, String>,
}

impl DebounceTable {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path, |details| WardenError::DebounceMalformed {
            path: path.to_path_buf(),
            details,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_restart(&self, session: &str) -> Option<DateTime<Utc>> {
        self.entries.get(session).and_then(|value| parse_rfc3339(value))
    }

    pub fn mark_restarted(&mut self, session: &str, now: DateTime<Utc>) {
        self.entries.insert(session.to_string(), now.to_rfc3339());
    }

    /// True while the session is still inside its restart debounce window.
    /// An unparseable stored timestamp counts as outside the window rather
    /// than pinning the session forever.
    pub fn within_window(&self, session: &str, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_restart(session) {
            Some(last) => now.signed_duration_since(last) < window,
            None => false,
        }
    }
}

pub(crate) fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn load_json<T, F>(path: &Path, malformed: F) -> Result<T>
where
    T: DeserializeOwned + Default,
    F: FnOnce(String) -> WardenError,
{
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(err) => return Err(WardenError::io(format!("read {}", path.display()), err)),
    };
    serde_json::from_slice(&data).map_err(|err| malformed(err.to_string()))
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| WardenError::io(format!("create {}", parent.display()), err))?;
    }
    let payload = serde_json::to_vec_pretty(value)
        .map_err(|err| WardenError::json(format!("serialize {}", path.display()), err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload)
        .map_err(|err| WardenError::io(format!("write {}", tmp_path.display()), err))?;
    fs::rename(&tmp_path, path)
        .map_err(|err| WardenError::io(format!("commit {}", path.display()), err))
}
