//! AI escalation phase: snapshot the system, consult the decision oracle,
//! execute whatever remediation it returns.
//!
//! Oracle-directed restarts flow through the same orchestrator and debounce
//! table as the restart phase, so the storm-prevention invariant holds no
//! matter who asked for the restart.

use crate::events::EventRecord;
use crate::host::TerminalHost;
use crate::oracle::{Action, Analysis, DecisionOracle, Snapshot};
use crate::orchestrator::Orchestrator;
use crate::phases::{Phase, PhaseReport};
use crate::session::SessionRecord;
use crate::state::{DebounceTable, PersistentState};
use crate::transcripts::{enforce_retention, write_transcript};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::debug;

pub struct EscalateContext<'a> {
    pub oracle: &'a dyn DecisionOracle,
    pub host: &'a dyn TerminalHost,
    pub orchestrator: &'a dyn Orchestrator,
    /// `None` when the durable table could not be read this cycle; restart
    /// actions are refused rather than issued unguarded.
    pub debounce: Option<&'a mut DebounceTable>,
    pub threshold: Duration,
    pub analyses_dir: &'a Path,
    pub retention: usize,
}

pub fn run(
    now: DateTime<Utc>,
    inventory: &[SessionRecord],
    snapshot: Snapshot,
    state: &mut PersistentState,
    ctx: EscalateContext<'_>,
) -> PhaseReport {
    let component = Phase::Escalate.component();
    let EscalateContext {
        oracle,
        host,
        orchestrator,
        mut debounce,
        threshold,
        analyses_dir,
        retention,
    } = ctx;

    let analysis = match oracle.analyze(&snapshot) {
        Ok(analysis) => analysis,
        Err(err) => {
            return PhaseReport::failed(
                Phase::Escalate,
                vec![EventRecord::error(
                    now,
                    component,
                    format!("oracle analysis failed: {}", err),
                )],
            );
        }
    };

    let mut events = Vec::new();
    let mut any_action_failed = false;

    if analysis.actions.is_empty() {
        events.push(EventRecord::info(
            now,
            component,
            "oracle reported no remediation needed",
        ));
    }

    for action in &analysis.actions {
        match execute_action(
            now,
            action,
            inventory,
            debounce.as_deref_mut(),
            state,
            host,
            orchestrator,
            threshold,
        ) {
            Ok(message) => events.push(EventRecord::info(now, component, message)),
            Err(message) => {
                any_action_failed = true;
                events.push(EventRecord::error(now, component, message));
            }
        }
    }

    // The oracle responded, so the analysis counts even when some of its
    // actions could not be carried out.
    state.ai_analyses_run += 1;
    state.last_analysis_ts = Some(now.to_rfc3339());

    record_transcript(
        now,
        state.cycles_run,
        &snapshot,
        &analysis,
        analyses_dir,
        retention,
        &mut events,
    );

    if any_action_failed {
        PhaseReport::failed(Phase::Escalate, events)
    } else {
        PhaseReport::completed(Phase::Escalate, events)
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_action(
    now: DateTime<Utc>,
    action: &Action,
    inventory: &[SessionRecord],
    debounce: Option<&mut DebounceTable>,
    state: &mut PersistentState,
    host: &dyn TerminalHost,
    orchestrator: &dyn Orchestrator,
    threshold: Duration,
) -> std::result::Result<String, String> {
    match action {
        Action::Restart { session } => {
            let record = inventory
                .iter()
                .find(|record| &record.name == session)
                .ok_or_else(|| format!("oracle requested restart of unknown session {}", session))?;
            let debounce = debounce
                .ok_or_else(|| format!("restart of {} refused: debounce table unavailable", session))?;
            if debounce.within_window(session, now, threshold) {
                return Ok(format!(
                    "oracle restart of {} skipped: inside debounce window",
                    session
                ));
            }
            orchestrator
                .restart_session(&record.category)
                .map_err(|err| format!("oracle restart of {} failed: {}", session, err))?;
            debounce.mark_restarted(session, now);
            state.handoffs_triggered += 1;
            Ok(format!("oracle restarted {}", session))
        }
        Action::Nudge { session, text } => {
            host.send_input(session, text)
                .map_err(|err| format!("oracle nudge of {} failed: {}", session, err))?;
            Ok(format!("oracle nudged {}", session))
        }
        Action::Note { text } => {
            orchestrator
                .file_ticket("warden improvement", text)
                .map_err(|err| format!("oracle ticket failed: {}", err))?;
            Ok(format!("oracle filed ticket: {}", text))
        }
    }
}

fn record_transcript(
    now: DateTime<Utc>,
    cycle: u64,
    snapshot: &Snapshot,
    analysis: &Analysis,
    analyses_dir: &Path,
    retention: usize,
    events: &mut Vec<EventRecord>,
) {
    let component = Phase::Escalate.component();
    match write_transcript(analyses_dir, cycle, now, snapshot, analysis) {
        Ok(path) => debug!(path = %path.display(), "Wrote oracle transcript"),
        Err(err) => {
            events.push(EventRecord::warn(
                now,
                component,
                format!("failed to write oracle transcript: {}", err),
            ));
            return;
        }
    }
    match enforce_retention(analyses_dir, retention) {
        Ok(0) => {}
        Ok(removed) => debug!(removed, "Evicted old oracle transcripts"),
        Err(err) => events.push(EventRecord::warn(
            now,
            component,
            format!("transcript retention failed: {}", err),
        )),
    }
}
