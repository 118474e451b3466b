//! Storage configuration and path management for Warden.
//!
//! All path decisions live here so tests can inject temp roots via
//! `StorageConfig::with_root()` and production code never hardcodes
//! a home-relative path twice.

use crate::error::{Result, WardenError};
use fs_err as fs;
use std::path::{Path, PathBuf};

/// Central configuration for all Warden storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.warden/`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all Warden data (default: ~/.warden)
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        Self {
            root: home.join(".warden"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Same as `Default::default()` but without the panic on a missing home.
    pub fn resolve() -> Result<Self> {
        let home = dirs::home_dir().ok_or(WardenError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(".warden"),
        })
    }

    /// Returns the root directory for Warden data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to config.json (supervisor knobs).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Path to the supervisor/ directory holding all durable cycle state.
    pub fn supervisor_dir(&self) -> PathBuf {
        self.root.join("supervisor")
    }

    /// Path to state.json (persistent counters and version record).
    pub fn state_file(&self) -> PathBuf {
        self.supervisor_dir().join("state.json")
    }

    /// Path to handoffs.json (session name -> last restart timestamp).
    pub fn debounce_file(&self) -> PathBuf {
        self.supervisor_dir().join("handoffs.json")
    }

    /// Path to events.jsonl (append-only event log).
    pub fn event_log_file(&self) -> PathBuf {
        self.supervisor_dir().join("events.jsonl")
    }

    /// Path to upgrade-pending.json (presence-flag marker).
    pub fn upgrade_marker_file(&self) -> PathBuf {
        self.supervisor_dir().join("upgrade-pending.json")
    }

    /// Path to analyses/ (oracle transcripts, FIFO-retained).
    pub fn analyses_dir(&self) -> PathBuf {
        self.supervisor_dir().join("analyses")
    }

    /// Path to daemon-backoff.json (supervisor start-storm record).
    pub fn backoff_file(&self) -> PathBuf {
        self.supervisor_dir().join("daemon-backoff.json")
    }

    /// Creates the directories the supervisor writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.supervisor_dir())
            .map_err(|err| WardenError::io("create supervisor directory", err))?;
        fs::create_dir_all(self.analyses_dir())
            .map_err(|err| WardenError::io("create analyses directory", err))?;
        Ok(())
    }
}
