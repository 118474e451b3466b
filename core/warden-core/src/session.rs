//! Session records and fleet name grammar.
//!
//! Fleet sessions are namespaced `<prefix>-...` and fall into a closed set of
//! categories. Each category knows its own orchestrator restart invocation,
//! so the restart logic itself stays category-agnostic.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Role patterns, matched after the fleet prefix is stripped.
static RE_REVIEWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9][a-z0-9_]*)-witness$").expect("reviewer pattern"));
static RE_REFINER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9][a-z0-9_]*)-refinery$").expect("refiner pattern"));
static RE_WORKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9][a-z0-9_]*)-crew-([A-Za-z0-9][A-Za-z0-9_-]*)$").expect("worker pattern")
});

/// Closed set of fleet session categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionCategory {
    /// The single fleet coordinator.
    Coordinator,
    /// The watchdog session; receives periodic nudges.
    Watcher,
    /// Per-rig reviewer.
    Reviewer { rig: String },
    /// Per-rig refiner.
    Refiner { rig: String },
    /// Named worker within a rig.
    Worker { rig: String, name: String },
}

impl SessionCategory {
    /// Parses a session name within the given fleet prefix.
    /// Returns `None` for sessions outside the fleet namespace.
    pub fn parse(prefix: &str, session_name: &str) -> Option<Self> {
        let rest = session_name.strip_prefix(prefix)?.strip_prefix('-')?;

        match rest {
            "mayor" => return Some(SessionCategory::Coordinator),
            "deacon" => return Some(SessionCategory::Watcher),
            _ => {}
        }

        if let Some(caps) = RE_WORKER.captures(rest) {
            return Some(SessionCategory::Worker {
                rig: caps[1].to_string(),
                name: caps[2].to_string(),
            });
        }
        if let Some(caps) = RE_REVIEWER.captures(rest) {
            return Some(SessionCategory::Reviewer {
                rig: caps[1].to_string(),
            });
        }
        if let Some(caps) = RE_REFINER.captures(rest) {
            return Some(SessionCategory::Refiner {
                rig: caps[1].to_string(),
            });
        }
        None
    }

    /// Short role identifier used in logs and snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionCategory::Coordinator => "mayor",
            SessionCategory::Watcher => "deacon",
            SessionCategory::Reviewer { .. } => "witness",
            SessionCategory::Refiner { .. } => "refinery",
            SessionCategory::Worker { .. } => "crew",
        }
    }

    /// Orchestrator argv for restarting a session of this category.
    pub fn restart_args(&self) -> Vec<String> {
        let arg = |value: &str| value.to_string();
        match self {
            SessionCategory::Coordinator => vec![arg("mayor"), arg("restart")],
            SessionCategory::Watcher => vec![arg("deacon"), arg("restart")],
            SessionCategory::Reviewer { rig } => {
                vec![arg("witness"), arg("restart"), arg("--rig"), rig.clone()]
            }
            SessionCategory::Refiner { rig } => {
                vec![arg("refinery"), arg("restart"), arg("--rig"), rig.clone()]
            }
            SessionCategory::Worker { rig, name } => vec![
                arg("crew"),
                arg("restart"),
                arg("--rig"),
                rig.clone(),
                arg("--name"),
                name.clone(),
            ],
        }
    }
}

impl std::fmt::Display for SessionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// A fleet session as observed in one inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub category: SessionCategory,
    pub created_at: DateTime<Utc>,
    pub pane_dead: bool,
    pub current_command: String,
}

impl SessionRecord {
    /// Age of the session relative to `now`. Clamped at zero so a host clock
    /// slightly ahead of ours never yields a negative age.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let age = now.signed_duration_since(self.created_at);
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }
}
