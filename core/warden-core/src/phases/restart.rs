//! Restart phase: the age/dead policy plus the per-session debounce.

use crate::events::EventRecord;
use crate::orchestrator::Orchestrator;
use crate::phases::{Phase, PhaseReport};
use crate::session::SessionRecord;
use crate::state::{DebounceTable, PersistentState};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// True when the session is a restart candidate: hosted process exited, or
/// the session outlived the handoff threshold.
pub fn needs_restart(record: &SessionRecord, now: DateTime<Utc>, threshold: Duration) -> bool {
    record.pane_dead || record.age(now) > threshold
}

pub fn run(
    now: DateTime<Utc>,
    inventory: &[SessionRecord],
    debounce: &mut DebounceTable,
    state: &mut PersistentState,
    orchestrator: &dyn Orchestrator,
    threshold: Duration,
) -> PhaseReport {
    let component = Phase::Restart.component();
    let mut events = Vec::new();
    let mut any_failed = false;

    for record in inventory {
        if !needs_restart(record, now, threshold) {
            continue;
        }

        // The debounce window applies to dead sessions too: host-reported
        // ages reset unreliably after a handoff, and a second kill inside
        // the window is exactly the storm this table exists to prevent.
        if debounce.within_window(&record.name, now, threshold) {
            debug!(
                session = %record.name,
                "Restart candidate still inside debounce window; skipping"
            );
            continue;
        }

        let age_secs = record.age(now).num_seconds();
        match orchestrator.restart_session(&record.category) {
            Ok(()) => {
                debounce.mark_restarted(&record.name, now);
                state.handoffs_triggered += 1;
                events.push(EventRecord::info(
                    now,
                    component,
                    format!(
                        "restarted {} (age {}s, dead={})",
                        record.name, age_secs, record.pane_dead
                    ),
                ));
            }
            Err(err) => {
                // Debounce entry stays untouched so the session is retried
                // naturally next cycle.
                any_failed = true;
                events.push(EventRecord::error(
                    now,
                    component,
                    format!("restart of {} failed: {}", record.name, err),
                ));
            }
        }
    }

    if any_failed {
        PhaseReport::failed(Phase::Restart, events)
    } else {
        PhaseReport::completed(Phase::Restart, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WardenError};
    use crate::events::EventLevel;
    use crate::phases::PhaseOutcome;
    use crate::session::SessionCategory;
    use std::sync::Mutex;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    fn crew(name: &str, created_at: DateTime<Utc>, pane_dead: bool) -> SessionRecord {
        let short = name
            .rsplit('-')
            .next()
            .expect("crew name")
            .to_string();
        SessionRecord {
            name: name.to_string(),
            category: SessionCategory::Worker {
                rig: "a".to_string(),
                name: short,
            },
            created_at,
            pane_dead,
            current_command: if pane_dead { String::new() } else { "claude".to_string() },
        }
    }

    #[derive(Default)]
    struct RecordingOrchestrator {
        restarts: Mutex<Vec<SessionCategory>>,
        fail_for: Option<SessionCategory>,
    }

    impl Orchestrator for RecordingOrchestrator {
        fn restart_session(&self, category: &SessionCategory) -> Result<()> {
            if self.fail_for.as_ref() == Some(category) {
                return Err(WardenError::CommandFailed {
                    command: "gt".to_string(),
                    details: "boom".to_string(),
                });
            }
            self.restarts.lock().expect("lock").push(category.clone());
            Ok(())
        }

        fn file_ticket(&self, _title: &str, _body: &str) -> Result<()> {
            Ok(())
        }
    }

    const HOUR: i64 = 3600;

    #[test]
    fn dead_session_is_revived_once() {
        let now = at("2026-03-01T10:00:00Z");
        let inventory = vec![crew("gt-a-crew-x", now - Duration::minutes(72), true)];
        let mut debounce = DebounceTable::default();
        let mut state = PersistentState::default();
        let orchestrator = RecordingOrchestrator::default();

        let report = run(
            now,
            &inventory,
            &mut debounce,
            &mut state,
            &orchestrator,
            Duration::seconds(HOUR),
        );

        assert_eq!(report.outcome, PhaseOutcome::Completed);
        assert_eq!(orchestrator.restarts.lock().expect("lock").len(), 1);
        assert_eq!(state.handoffs_triggered, 1);
        assert_eq!(debounce.last_restart("gt-a-crew-x"), Some(now));
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].level, EventLevel::Info);
        assert!(report.events[0].message.contains("gt-a-crew-x"));
        assert!(report.events[0].message.contains("4320s"));
    }

    #[test]
    fn storm_prevention_within_window() {
        let restart_time = at("2026-03-01T10:00:00Z");
        let mut debounce = DebounceTable::default();
        debounce.mark_restarted("gt-a-crew-x", restart_time);

        // Ten minutes later the host still reports an 80-minute age.
        let now = restart_time + Duration::minutes(10);
        let inventory = vec![crew("gt-a-crew-x", now - Duration::minutes(80), false)];
        let mut state = PersistentState::default();
        let orchestrator = RecordingOrchestrator::default();

        let report = run(
            now,
            &inventory,
            &mut debounce,
            &mut state,
            &orchestrator,
            Duration::seconds(HOUR),
        );

        assert_eq!(report.outcome, PhaseOutcome::Completed);
        assert!(orchestrator.restarts.lock().expect("lock").is_empty());
        assert_eq!(state.handoffs_triggered, 0);
        assert_eq!(debounce.last_restart("gt-a-crew-x"), Some(restart_time));
        assert!(report.events.is_empty());
    }

    #[test]
    fn young_live_sessions_are_left_alone() {
        let now = at("2026-03-01T10:00:00Z");
        let inventory = vec![crew("gt-a-crew-x", now - Duration::minutes(20), false)];
        let mut debounce = DebounceTable::default();
        let mut state = PersistentState::default();
        let orchestrator = RecordingOrchestrator::default();

        let report = run(
            now,
            &inventory,
            &mut debounce,
            &mut state,
            &orchestrator,
            Duration::seconds(HOUR),
        );
        assert_eq!(report.outcome, PhaseOutcome::Completed);
        assert!(orchestrator.restarts.lock().expect("lock").is_empty());
        assert!(debounce.is_empty());
    }

    #[test]
    fn one_failure_does_not_stop_the_rest() {
        let now = at("2026-03-01T10:00:00Z");
        let old = now - Duration::minutes(90);
        let inventory = vec![
            crew("gt-a-crew-x", old, false),
            crew("gt-a-crew-y", old, true),
            crew("gt-a-crew-z", old, false),
        ];
        let mut debounce = DebounceTable::default();
        let mut state = PersistentState::default();
        let orchestrator = RecordingOrchestrator {
            fail_for: Some(SessionCategory::Worker {
                rig: "a".to_string(),
                name: "y".to_string(),
            }),
            ..RecordingOrchestrator::default()
        };

        let report = run(
            now,
            &inventory,
            &mut debounce,
            &mut state,
            &orchestrator,
            Duration::seconds(HOUR),
        );

        assert_eq!(report.outcome, PhaseOutcome::Failed);
        assert_eq!(orchestrator.restarts.lock().expect("lock").len(), 2);
        assert_eq!(state.handoffs_triggered, 2);
        // The failed session keeps no debounce entry and stays eligible.
        assert!(debounce.last_restart("gt-a-crew-y").is_none());
        assert_eq!(debounce.len(), 2);
        let errors: Vec<_> = report
            .events
            .iter()
            .filter(|event| event.level == EventLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("gt-a-crew-y"));
    }

    #[test]
    fn debounce_holds_across_many_cycles() {
        let start = at("2026-03-01T10:00:00Z");
        let mut debounce = DebounceTable::default();
        let mut state = PersistentState::default();
        let orchestrator = RecordingOrchestrator::default();
        let threshold = Duration::seconds(HOUR);

        // Host never resets the age; cycles every 20 minutes for 2 hours.
        for minutes in (0..=120).step_by(20) {
            let now = start + Duration::minutes(minutes);
            let inventory = vec![crew("gt-a-crew-x", start - Duration::minutes(70), false)];
            run(
                now,
                &inventory,
                &mut debounce,
                &mut state,
                &orchestrator,
                threshold,
            );
        }

        // Restarts land exactly at 0, 60 and 120 minutes; every cycle in
        // between is inside the window.
        assert_eq!(state.handoffs_triggered, 3);
        let restarts = orchestrator.restarts.lock().expect("lock");
        assert_eq!(restarts.len(), 3);
    }
}
