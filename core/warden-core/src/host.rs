//! Terminal-host adapter: session listing, pane status, input injection.
//!
//! The supervisor never caches host state across cycles; tmux is the source
//! of truth and changes underneath us at any time. A session that vanishes
//! between the listing and a per-session query is simply gone, not an error.

use crate::error::{Result, WardenError};
use crate::exec::{command_line, run_with_timeout};
use crate::session::{SessionCategory, SessionRecord};
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use tracing::debug;

/// Status of the single hosted pane of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneStatus {
    pub dead: bool,
    pub command: String,
}

/// What the supervisor needs from the multiplexed terminal host.
pub trait TerminalHost {
    /// Point-in-time listing of (session name, created-at) pairs.
    fn list_sessions(&self) -> Result<Vec<(String, DateTime<Utc>)>>;

    /// Pane status for one session; `None` when the session no longer exists.
    fn query_pane(&self, session: &str) -> Result<Option<PaneStatus>>;

    /// Types `text` followed by Enter into the session's active pane.
    fn send_input(&self, session: &str, text: &str) -> Result<()>;
}

/// `TerminalHost` backed by the `tmux` CLI.
#[derive(Debug, Clone)]
pub struct TmuxHost {
    timeout: Duration,
}

impl TmuxHost {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, args: &[&str]) -> Result<crate::exec::CommandOutput> {
        run_with_timeout("tmux", args, None, self.timeout)
    }
}

impl TerminalHost for TmuxHost {
    fn list_sessions(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let args = [
            "list-sessions",
            "-F",
            "#{session_name}\t#{session_created}",
        ];
        let output = self.run(&args)?;
        if !output.status_ok {
            // tmux exits nonzero when no server is running: an empty fleet,
            // not a failure.
            debug!(stderr = %output.stderr.trim(), "tmux list-sessions returned nonzero");
            return Ok(Vec::new());
        }
        Ok(parse_session_list(&output.stdout))
    }

    fn query_pane(&self, session: &str) -> Result<Option<PaneStatus>> {
        let args = [
            "list-panes",
            "-t",
            session,
            "-F",
            "#{pane_dead}\t#{pane_current_command}",
        ];
        let output = self.run(&args)?;
        if !output.status_ok {
            return Ok(None);
        }
        Ok(parse_pane_status(&output.stdout))
    }

    fn send_input(&self, session: &str, text: &str) -> Result<()> {
        let args = ["send-keys", "-t", session, text, "Enter"];
        let output = self.run(&args)?;
        if !output.status_ok {
            let stderr = output.stderr.trim();
            if stderr.contains("can't find") {
                return Err(WardenError::SessionNotFound(session.to_string()));
            }
            return Err(WardenError::CommandFailed {
                command: command_line("tmux", &args),
                details: stderr.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_session_list(output: &str) -> Vec<(String, DateTime<Utc>)> {
    let mut sessions = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let name = parts.next()?.trim();
            let created = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let epoch: i64 = created.parse().ok()?;
            let created_at = Utc.timestamp_opt(epoch, 0).single()?;
            Some((name.to_string(), created_at))
        })
        .collect::<Vec<_>>();
    sessions.sort_by(|left, right| left.0.cmp(&right.0));
    sessions
}

fn parse_pane_status(output: &str) -> Option<PaneStatus> {
    // First pane only; fleet sessions host a single worker pane.
    let line = output.lines().next()?;
    let mut parts = line.split('\t');
    let dead = parts.next()?.trim() == "1";
    let command = parts.next().map(str::trim).unwrap_or_default().to_string();
    Some(PaneStatus { dead, command })
}

/// Builds the cycle's session inventory: fleet sessions only, pane status
/// resolved per session, disappeared sessions dropped.
pub fn collect_inventory(
    host: &dyn TerminalHost,
    prefix: &str,
) -> Result<Vec<SessionRecord>> {
    let mut inventory = Vec::new();
    for (name, created_at) in host.list_sessions()? {
        let Some(category) = SessionCategory::parse(prefix, &name) else {
            continue;
        };
        let pane = match host.query_pane(&name) {
            Ok(Some(pane)) => pane,
            Ok(None) => {
                debug!(session = %name, "Session disappeared between list and query");
                continue;
            }
            Err(err) => {
                debug!(session = %name, error = %err, "Pane query failed; treating session as gone");
                continue;
            }
        };
        inventory.push(SessionRecord {
            name,
            category,
            created_at,
            pane_dead: pane.dead,
            current_command: pane.command,
        });
    }
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn parse_session_list_ignores_invalid_lines() {
        let raw = "gt-mayor\t1767225600\ngt-a-crew-x\t1767229200\nbroken-line\n\t123\n";
        let parsed = parse_session_list(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "gt-a-crew-x");
        assert_eq!(parsed[1].0, "gt-mayor");
        assert_eq!(parsed[1].1.timestamp(), 1767225600);
    }

    #[test]
    fn parse_pane_status_reads_first_pane() {
        let status = parse_pane_status("0\tclaude\n1\tbash\n").expect("status");
        assert!(!status.dead);
        assert_eq!(status.command, "claude");

        let dead = parse_pane_status("1\t\n").expect("status");
        assert!(dead.dead);
        assert_eq!(dead.command, "");

        assert_eq!(parse_pane_status(""), None);
    }

    struct FakeHost {
        sessions: Vec<(String, DateTime<Utc>)>,
        panes: Mutex<HashMap<String, PaneStatus>>,
    }

    impl TerminalHost for FakeHost {
        fn list_sessions(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
            Ok(self.sessions.clone())
        }

        fn query_pane(&self, session: &str) -> Result<Option<PaneStatus>> {
            Ok(self.panes.lock().expect("lock panes").get(session).cloned())
        }

        fn send_input(&self, _session: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn inventory_keeps_fleet_sessions_and_drops_the_rest() {
        let created = Utc.timestamp_opt(1767225600, 0).single().expect("ts");
        let host = FakeHost {
            sessions: vec![
                ("gt-mayor".to_string(), created),
                ("gt-a-crew-x".to_string(), created),
                ("scratchpad".to_string(), created),
                ("gt-gone-witness".to_string(), created),
            ],
            panes: Mutex::new(HashMap::from([
                (
                    "gt-mayor".to_string(),
                    PaneStatus {
                        dead: false,
                        command: "claude".to_string(),
                    },
                ),
                (
                    "gt-a-crew-x".to_string(),
                    PaneStatus {
                        dead: true,
                        command: "kimi".to_string(),
                    },
                ),
                // gt-gone-witness has no pane entry: vanished after listing.
            ])),
        };

        let inventory = collect_inventory(&host, "gt").expect("inventory");
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory[0].name, "gt-mayor");
        assert!(!inventory[0].pane_dead);
        assert_eq!(inventory[1].name, "gt-a-crew-x");
        assert!(inventory[1].pane_dead);
        assert_eq!(inventory[1].current_command, "kimi");
    }
}
