//! Supervisor configuration loading and saving.
//!
//! Every knob has a default, so a missing config file is not an error and a
//! partial file only overrides what it names. A malformed file falls back to
//! defaults with a warning; losing tuning is acceptable, crashing is not.

use crate::error::{Result, WardenError};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 1200;
pub const DEFAULT_HANDOFF_THRESHOLD_SECS: u64 = 3600;
pub const DEFAULT_NUDGE_EVERY_N: u64 = 3;
pub const DEFAULT_AI_EVERY_M: u64 = 2;
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_AI_LOG_RETENTION: usize = 50;
pub const DEFAULT_HOST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SNAPSHOT_EVENT_TAIL: usize = 50;

const DEFAULT_WATCHER_NUDGE: &str =
    "Check fleet health: review stalled rigs, unstick blocked crews, and report findings.";
const DEFAULT_RELEASE_FEED_URL: &str =
    "https://api.github.com/repos/steveyegge/gastown/releases/latest";

/// Supervisor configuration, persisted as JSON under the storage root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Seconds between scheduler wake-ups.
    pub cycle_interval_secs: u64,
    /// Session age (and restart debounce window) in seconds.
    pub handoff_threshold_secs: u64,
    /// Nudge the watcher every Nth cycle.
    pub nudge_every_n: u64,
    /// Run AI escalation every Mth cycle.
    pub ai_every_m: u64,
    /// Hard deadline for one oracle invocation.
    pub ai_timeout_secs: u64,
    /// How many oracle transcripts to keep (FIFO by creation order).
    pub ai_log_retention: usize,
    /// Fleet namespace prefix for session names.
    pub session_prefix: String,
    /// Instruction text delivered to the watcher session.
    pub watcher_nudge: String,
    /// Release feed endpoint (GitHub releases JSON).
    pub release_feed_url: String,
    /// Oracle CLI program and leading arguments; the prompt is appended.
    pub oracle_program: String,
    pub oracle_args: Vec<String>,
    /// Orchestrator CLI used for category-specific restarts and tickets.
    pub orchestrator_program: String,
    /// Deadline for terminal-host and orchestrator commands.
    pub host_timeout_secs: u64,
    /// Event-log lines included in the oracle snapshot.
    pub snapshot_event_tail: usize,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: DEFAULT_CYCLE_INTERVAL_SECS,
            handoff_threshold_secs: DEFAULT_HANDOFF_THRESHOLD_SECS,
            nudge_every_n: DEFAULT_NUDGE_EVERY_N,
            ai_every_m: DEFAULT_AI_EVERY_M,
            ai_timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
            ai_log_retention: DEFAULT_AI_LOG_RETENTION,
            session_prefix: "gt".to_string(),
            watcher_nudge: DEFAULT_WATCHER_NUDGE.to_string(),
            release_feed_url: DEFAULT_RELEASE_FEED_URL.to_string(),
            oracle_program: "claude".to_string(),
            oracle_args: vec!["-p".to_string()],
            orchestrator_program: "gt".to_string(),
            host_timeout_secs: DEFAULT_HOST_TIMEOUT_SECS,
            snapshot_event_tail: DEFAULT_SNAPSHOT_EVENT_TAIL,
        }
    }
}

impl WardenConfig {
    /// Clamps values that would break the scheduler (modulo-zero gating,
    /// zero-length cycles).
    pub fn sanitized(mut self) -> Self {
        if self.cycle_interval_secs == 0 {
            self.cycle_interval_secs = 1;
        }
        if self.nudge_every_n == 0 {
            self.nudge_every_n = 1;
        }
        if self.ai_every_m == 0 {
            self.ai_every_m = 1;
        }
        self
    }

    /// The fully-qualified name of the watcher session for this prefix.
    pub fn watcher_session(&self) -> String {
        format!("{}-deacon", self.session_prefix)
    }
}

/// Loads the supervisor configuration, returning defaults if the file is
/// missing or unreadable.
pub fn load_config(path: &Path) -> WardenConfig {
    let config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<WardenConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Config malformed; using defaults");
                WardenConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => WardenConfig::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Config unreadable; using defaults");
            WardenConfig::default()
        }
    };
    config.sanitized()
}

/// Saves the supervisor configuration to disk.
pub fn save_config(path: &Path, config: &WardenConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| WardenError::io("create config dir", err))?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|err| WardenError::json("serialize config", err))?;
    fs::write(path, content).map_err(|err| WardenError::io("write config", err))
}
