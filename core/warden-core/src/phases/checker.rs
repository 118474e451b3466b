//! Upstream version checker phase.
//!
//! Notices newer upstream releases and records a pending-upgrade marker.
//! `last_known_release` is deliberately NOT advanced here; that only happens
//! when an upgrade is actually applied, so the WARN keeps firing until then.

use crate::events::EventRecord;
use crate::phases::{Phase, PhaseReport};
use crate::state::PersistentState;
use crate::upstream::{
    clear_upgrade_marker, upgrade_marker_exists, write_upgrade_marker, PendingUpgrade, ReleaseFeed,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

pub fn run(
    now: DateTime<Utc>,
    feed: &dyn ReleaseFeed,
    state: &mut PersistentState,
    marker_path: &Path,
) -> PhaseReport {
    let component = Phase::Checker.component();

    let release = match feed.latest_release() {
        Ok(release) => release,
        Err(err) => {
            return PhaseReport::failed(
                Phase::Checker,
                vec![EventRecord::error(
                    now,
                    component,
                    format!("release feed query failed: {}", err),
                )],
            );
        }
    };

    state.last_check_ts = Some(now.to_rfc3339());

    if !release.tag.is_empty() && release.tag != state.last_known_release {
        let known = if state.last_known_release.is_empty() {
            "<none>"
        } else {
            state.last_known_release.as_str()
        };
        let mut events = vec![EventRecord::warn(
            now,
            component,
            format!(
                "upstream release {} available (last known {})",
                release.tag, known
            ),
        )];
        if let Err(err) = write_upgrade_marker(marker_path, &PendingUpgrade::new(&release, now)) {
            events.push(EventRecord::error(
                now,
                component,
                format!("failed to record pending upgrade: {}", err),
            ));
            return PhaseReport::failed(Phase::Checker, events);
        }
        return PhaseReport::completed(Phase::Checker, events);
    }

    // Remote matches what we already know. A leftover marker means the
    // upgrade landed out-of-band; retire it.
    if upgrade_marker_exists(marker_path) {
        let event = match clear_upgrade_marker(marker_path) {
            Ok(()) => EventRecord::info(
                now,
                component,
                format!("cleared stale upgrade marker; {} is current", release.tag),
            ),
            Err(err) => EventRecord::error(
                now,
                component,
                format!("failed to clear stale upgrade marker: {}", err),
            ),
        };
        return PhaseReport::completed(Phase::Checker, vec![event]);
    }

    debug!(tag = %release.tag, "Upstream release unchanged");
    PhaseReport::completed(Phase::Checker, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WardenError};
    use crate::events::EventLevel;
    use crate::phases::PhaseOutcome;
    use crate::upstream::Release;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    struct FixedFeed(Result<Release>);

    impl ReleaseFeed for FixedFeed {
        fn latest_release(&self) -> Result<Release> {
            match &self.0 {
                Ok(release) => Ok(release.clone()),
                Err(_) => Err(WardenError::ReleaseFeed("connection refused".to_string())),
            }
        }
    }

    fn release(tag: &str) -> Release {
        Release {
            tag: tag.to_string(),
            commit: "abc123".to_string(),
            published_at: None,
        }
    }

    #[test]
    fn newer_release_warns_and_writes_marker() {
        let temp = tempfile::tempdir().expect("temp dir");
        let marker = temp.path().join("upgrade-pending.json");
        let mut state = PersistentState::default();
        state.last_known_release = "v0.4.1".to_string();

        let report = run(
            at("2026-03-01T10:00:00Z"),
            &FixedFeed(Ok(release("v0.4.2"))),
            &mut state,
            &marker,
        );
        assert_eq!(report.outcome, PhaseOutcome::Completed);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].level, EventLevel::Warn);
        assert!(marker.exists());
        // Knowledge only advances when the upgrade is applied.
        assert_eq!(state.last_known_release, "v0.4.1");
        assert!(state.last_check_ts.is_some());
    }

    #[test]
    fn rechecking_unchanged_remote_is_idempotent() {
        let temp = tempfile::tempdir().expect("temp dir");
        let marker = temp.path().join("upgrade-pending.json");
        let mut state = PersistentState::default();
        state.last_known_release = "v0.4.1".to_string();

        let first = run(
            at("2026-03-01T10:00:00Z"),
            &FixedFeed(Ok(release("v0.4.2"))),
            &mut state,
            &marker,
        );
        let state_after_first = state.clone();
        let second = run(
            at("2026-03-01T10:20:00Z"),
            &FixedFeed(Ok(release("v0.4.2"))),
            &mut state,
            &marker,
        );
        assert_eq!(first.outcome, PhaseOutcome::Completed);
        assert_eq!(second.outcome, PhaseOutcome::Completed);
        assert!(marker.exists());

        // Only last_check_ts moved.
        let mut expected = state_after_first;
        expected.last_check_ts = Some(at("2026-03-01T10:20:00Z").to_rfc3339());
        assert_eq!(state, expected);
    }

    #[test]
    fn stale_marker_is_cleared_once_remote_matches() {
        let temp = tempfile::tempdir().expect("temp dir");
        let marker = temp.path().join("upgrade-pending.json");
        let mut state = PersistentState::default();
        state.last_known_release = "v0.4.2".to_string();
        write_upgrade_marker(&marker, &PendingUpgrade::new(&release("v0.4.2"), Utc::now()))
            .expect("seed marker");

        let report = run(
            at("2026-03-01T10:00:00Z"),
            &FixedFeed(Ok(release("v0.4.2"))),
            &mut state,
            &marker,
        );
        assert_eq!(report.outcome, PhaseOutcome::Completed);
        assert!(!marker.exists());
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].level, EventLevel::Info);
    }

    #[test]
    fn feed_failure_leaves_state_untouched() {
        let temp = tempfile::tempdir().expect("temp dir");
        let marker = temp.path().join("upgrade-pending.json");
        let mut state = PersistentState::default();
        state.last_known_release = "v0.4.1".to_string();
        let before = state.clone();

        let report = run(
            at("2026-03-01T10:00:00Z"),
            &FixedFeed(Err(WardenError::ReleaseFeed("boom".to_string()))),
            &mut state,
            &marker,
        );
        assert_eq!(report.outcome, PhaseOutcome::Failed);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].level, EventLevel::Error);
        assert_eq!(state, before);
        assert!(!marker.exists());
    }
}
