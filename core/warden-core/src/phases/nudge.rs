//! Nudge phase: fire-and-forget instruction delivery to the watcher session.

use crate::events::EventRecord;
use crate::host::TerminalHost;
use crate::phases::{Phase, PhaseReport};
use chrono::{DateTime, Utc};

pub fn run(
    now: DateTime<Utc>,
    host: &dyn TerminalHost,
    watcher_session: &str,
    instruction: &str,
) -> PhaseReport {
    let component = Phase::Nudge.component();
    match host.send_input(watcher_session, instruction) {
        Ok(()) => PhaseReport::completed(
            Phase::Nudge,
            vec![EventRecord::info(
                now,
                component,
                format!("nudged {}", watcher_session),
            )],
        ),
        // No retry here; the next scheduled nudge cycle tries again.
        Err(err) => PhaseReport::failed(
            Phase::Nudge,
            vec![EventRecord::error(
                now,
                component,
                format!("nudge of {} failed: {}", watcher_session, err),
            )],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WardenError};
    use crate::events::EventLevel;
    use crate::host::PaneStatus;
    use crate::phases::PhaseOutcome;
    use std::sync::Mutex;

    struct FakeHost {
        missing: bool,
        inputs: Mutex<Vec<(String, String)>>,
    }

    impl TerminalHost for FakeHost {
        fn list_sessions(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
            Ok(Vec::new())
        }

        fn query_pane(&self, _session: &str) -> Result<Option<PaneStatus>> {
            Ok(None)
        }

        fn send_input(&self, session: &str, text: &str) -> Result<()> {
            if self.missing {
                return Err(WardenError::SessionNotFound(session.to_string()));
            }
            self.inputs
                .lock()
                .expect("lock")
                .push((session.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn delivers_the_instruction() {
        let host = FakeHost {
            missing: false,
            inputs: Mutex::new(Vec::new()),
        };
        let report = run(Utc::now(), &host, "gt-deacon", "check fleet health");
        assert_eq!(report.outcome, PhaseOutcome::Completed);
        let inputs = host.inputs.lock().expect("lock");
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].0, "gt-deacon");
        assert_eq!(inputs[0].1, "check fleet health");
    }

    #[test]
    fn missing_watcher_is_an_error_event() {
        let host = FakeHost {
            missing: true,
            inputs: Mutex::new(Vec::new()),
        };
        let report = run(Utc::now(), &host, "gt-deacon", "check fleet health");
        assert_eq!(report.outcome, PhaseOutcome::Failed);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].level, EventLevel::Error);
        assert!(report.events[0].message.contains("gt-deacon"));
    }
}
