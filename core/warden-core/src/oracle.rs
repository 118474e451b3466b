//! The decision oracle: snapshot types, remediation actions, and the CLI
//! bridge that feeds a system snapshot to an external AI agent.

use crate::error::{Result, WardenError};
use crate::events::EventRecord;
use crate::exec::run_with_timeout;
use crate::session::SessionRecord;
use crate::state::PersistentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flattened session view embedded in oracle snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub name: String,
    pub role: String,
    pub age_secs: i64,
    pub pane_dead: bool,
    pub current_command: String,
}

impl SessionView {
    pub fn from_record(record: &SessionRecord, now: DateTime<Utc>) -> Self {
        Self {
            name: record.name.clone(),
            role: record.category.kind().to_string(),
            age_secs: record.age(now).num_seconds(),
            pane_dead: record.pane_dead,
            current_command: record.current_command.clone(),
        }
    }
}

/// Everything the oracle gets to see: the live fleet, the durable counters,
/// and the recent event-log tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: String,
    pub sessions: Vec<SessionView>,
    pub state: PersistentState,
    pub recent_events: Vec<EventRecord>,
}

impl Snapshot {
    pub fn capture(
        now: DateTime<Utc>,
        inventory: &[SessionRecord],
        state: &PersistentState,
        recent_events: Vec<EventRecord>,
    ) -> Self {
        Self {
            captured_at: now.to_rfc3339(),
            sessions: inventory
                .iter()
                .map(|record| SessionView::from_record(record, now))
                .collect(),
            state: state.clone(),
            recent_events,
        }
    }
}

/// Remediation actions the oracle may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Restart the named session through the orchestrator.
    Restart { session: String },
    /// Deliver an instruction into the named session.
    Nudge { session: String, text: String },
    /// File an improvement ticket.
    Note { text: String },
}

/// Parsed oracle response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub summary: Option<String>,
}

pub trait DecisionOracle {
    fn analyze(&self, snapshot: &Snapshot) -> Result<Analysis>;
}

const ORACLE_INSTRUCTIONS: &str = "You are the remediation oracle for a tmux agent fleet. \
Review the JSON system snapshot below and respond with a single JSON object: \
{\"actions\": [...], \"summary\": \"...\"}. Valid actions: \
{\"kind\":\"restart\",\"session\":NAME}, \
{\"kind\":\"nudge\",\"session\":NAME,\"text\":TEXT}, \
{\"kind\":\"note\",\"text\":TEXT}. \
Return {\"actions\": []} when the fleet is healthy.";

/// `DecisionOracle` that shells out to an AI CLI (`claude -p <prompt>` by
/// default) and parses the JSON object in its stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl DecisionOracle for CommandOracle {
    fn analyze(&self, snapshot: &Snapshot) -> Result<Analysis> {
        let payload = serde_json::to_string_pretty(snapshot)
            .map_err(|err| WardenError::json("serialize snapshot", err))?;
        let prompt = format!("{}\n\n{}", ORACLE_INSTRUCTIONS, payload);

        let mut argv: Vec<&str> = self.args.iter().map(String::as_str).collect();
        argv.push(&prompt);

        let output = run_with_timeout(&self.program, &argv, None, self.timeout)?;
        if !output.status_ok {
            return Err(WardenError::Oracle(format!(
                "{} exited nonzero: {}",
                self.program,
                output.stderr.trim()
            )));
        }
        parse_analysis(&output.stdout)
    }
}

/// Extracts and parses the first JSON object in the oracle's output. CLI
/// agents tend to wrap their answer in prose, so everything before the first
/// `{` and after the last `}` is ignored.
pub fn parse_analysis(stdout: &str) -> Result<Analysis> {
    let start = stdout
        .find('{')
        .ok_or_else(|| WardenError::OracleResponseMalformed("no JSON object in output".into()))?;
    let end = stdout
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| WardenError::OracleResponseMalformed("unterminated JSON object".into()))?;
    serde_json::from_str(&stdout[start..=end])
        .map_err(|err| WardenError::OracleResponseMalformed(err.to_string()))
}
