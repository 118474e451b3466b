//! The cycle scheduler: owns the durable state, drives the four phases in
//! order, and enforces the failure-isolation and fatality rules.
//!
//! One supervisor instance is the single writer of `state.json` and
//! `handoffs.json`. Phases run strictly sequentially within a cycle, and no
//! cycle starts before the previous one has finished or been abandoned on
//! its collaborators' deadlines.

use crate::config::WardenConfig;
use crate::error::Result;
use crate::events::{EventLevel, EventLog, EventRecord};
use crate::host::{collect_inventory, TerminalHost};
use crate::oracle::{DecisionOracle, Snapshot};
use crate::orchestrator::Orchestrator;
use crate::phases::{checker, escalate, nudge, restart, Phase, PhaseOutcome, PhaseReport};
use crate::state::{DebounceTable, PersistentState};
use crate::storage::StorageConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// External collaborators, injected so tests can run whole cycles against
/// fakes.
pub struct Collaborators {
    pub host: Box<dyn TerminalHost>,
    pub orchestrator: Box<dyn Orchestrator>,
    pub feed: Box<dyn crate::upstream::ReleaseFeed>,
    pub oracle: Box<dyn DecisionOracle>,
}

/// Summary of one completed cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub reports: Vec<PhaseReport>,
}

impl CycleReport {
    pub fn outcome_of(&self, phase: Phase) -> Option<PhaseOutcome> {
        self.reports
            .iter()
            .find(|report| report.phase == phase)
            .map(|report| report.outcome)
    }
}

pub struct Supervisor {
    config: WardenConfig,
    storage: StorageConfig,
    collaborators: Collaborators,
    state: PersistentState,
    event_log: EventLog,
}

impl Supervisor {
    /// Loads (or initializes) the durable state and builds the supervisor.
    /// A corrupt state record is reset to defaults with a WARN; historical
    /// counters are expendable, the debounce guarantee is not.
    pub fn new(
        config: WardenConfig,
        storage: StorageConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        storage.ensure_dirs()?;
        let event_log = EventLog::new(storage.event_log_file());

        let state = match PersistentState::load(&storage.state_file()) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "State record unreadable; reinitializing with defaults");
                event_log.append(&EventRecord::warn(
                    Utc::now(),
                    "supervisor",
                    format!("state record reset to defaults: {}", err),
                ))?;
                PersistentState::default()
            }
        };

        Ok(Self {
            config: config.sanitized(),
            storage,
            collaborators,
            state,
            event_log,
        })
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    fn handoff_threshold(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.handoff_threshold_secs as i64)
    }

    /// Runs one full cycle. Returns `Err` only for process-fatal conditions
    /// (state store or event log unwritable); everything else is converted
    /// to events.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        // Counter first, so a crash mid-cycle never reuses a cycle number.
        self.state.cycles_run += 1;
        self.state.save(&self.storage.state_file())?;
        let cycle = self.state.cycles_run;
        info!(cycle, "Cycle started");

        let threshold = self.handoff_threshold();
        let mut reports = Vec::new();

        // Fresh inventory snapshot; the host owns the truth.
        let inventory = match collect_inventory(&*self.collaborators.host, &self.config.session_prefix)
        {
            Ok(inventory) => Some(inventory),
            Err(err) => {
                self.event_log.append(&EventRecord::error(
                    now,
                    "inventory",
                    format!("session inventory failed: {}", err),
                ))?;
                None
            }
        };

        // The debounce table is read once per cycle and written back once.
        // `None` marks a corrupt table: restart activity is suspended for
        // the cycle instead of silently starting from empty.
        let mut debounce = match DebounceTable::load(&self.storage.debounce_file()) {
            Ok(table) => Some(table),
            Err(err) => {
                error!(error = %err, "Debounce table unreadable; suspending restarts this cycle");
                self.event_log.append(&EventRecord::error(
                    now,
                    Phase::Restart.component(),
                    format!("debounce table unreadable, restarts suspended: {}", err),
                ))?;
                None
            }
        };

        // Phase order is fixed: checker, restart, nudge, escalation.
        let report = checker::run(
            now,
            &*self.collaborators.feed,
            &mut self.state,
            &self.storage.upgrade_marker_file(),
        );
        self.emit(report, &mut reports)?;

        let report = match (&inventory, &mut debounce) {
            (Some(inventory), Some(debounce)) => restart::run(
                now,
                inventory,
                debounce,
                &mut self.state,
                &*self.collaborators.orchestrator,
                threshold,
            ),
            (None, _) => PhaseReport::skipped(
                Phase::Restart,
                vec![EventRecord::error(
                    now,
                    Phase::Restart.component(),
                    "restart phase skipped: no session inventory",
                )],
            ),
            (_, None) => PhaseReport::skipped(Phase::Restart, Vec::new()),
        };
        self.emit(report, &mut reports)?;

        if cycle % self.config.nudge_every_n == 0 {
            let report = nudge::run(
                now,
                &*self.collaborators.host,
                &self.config.watcher_session(),
                &self.config.watcher_nudge,
            );
            self.emit(report, &mut reports)?;
        }

        if cycle % self.config.ai_every_m == 0 {
            let inventory_slice: &[_] = inventory.as_deref().unwrap_or(&[]);
            let snapshot = Snapshot::capture(
                now,
                inventory_slice,
                &self.state,
                self.event_log.tail(self.config.snapshot_event_tail),
            );
            let report = escalate::run(
                now,
                inventory_slice,
                snapshot,
                &mut self.state,
                escalate::EscalateContext {
                    oracle: &*self.collaborators.oracle,
                    host: &*self.collaborators.host,
                    orchestrator: &*self.collaborators.orchestrator,
                    debounce: debounce.as_mut(),
                    threshold,
                    analyses_dir: &self.storage.analyses_dir(),
                    retention: self.config.ai_log_retention,
                },
            );
            self.emit(report, &mut reports)?;
        }

        // Persist what the phases mutated. Failure to write durable state
        // defeats the debounce guarantee, so it is fatal.
        if let Some(debounce) = debounce {
            debounce.save(&self.storage.debounce_file())?;
        }
        self.state.save(&self.storage.state_file())?;

        info!(cycle, "Cycle finished");
        Ok(CycleReport { cycle, reports })
    }

    /// Runs cycles forever at the configured interval, scheduled against
    /// wall-clock so slow cycles do not accumulate drift. Returns when the
    /// shutdown flag is raised or a process-fatal error occurs.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let interval = Duration::from_secs(self.config.cycle_interval_secs);
        let mut next_wake = Instant::now();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested; supervisor loop exiting");
                return Ok(());
            }

            let started = Instant::now();
            let now = Utc::now();
            self.run_cycle(now)?;

            let elapsed = started.elapsed();
            if elapsed > interval {
                warn!(
                    elapsed_secs = elapsed.as_secs(),
                    interval_secs = interval.as_secs(),
                    "Cycle overran its interval"
                );
                self.event_log.append(&EventRecord::warn(
                    Utc::now(),
                    "supervisor",
                    format!(
                        "cycle {} overran interval ({}s > {}s)",
                        self.state.cycles_run,
                        elapsed.as_secs(),
                        interval.as_secs()
                    ),
                ))?;
                next_wake = Instant::now();
            } else {
                next_wake += interval;
                let floor = Instant::now();
                if next_wake < floor {
                    next_wake = floor;
                }
            }

            if sleep_until(next_wake, shutdown) {
                info!("Shutdown requested during sleep; supervisor loop exiting");
                return Ok(());
            }
        }
    }

    fn emit(&mut self, report: PhaseReport, reports: &mut Vec<PhaseReport>) -> Result<()> {
        for event in &report.events {
            match event.level {
                EventLevel::Info => info!(component = %event.component, "{}", event.message),
                EventLevel::Warn => warn!(component = %event.component, "{}", event.message),
                EventLevel::Error => error!(component = %event.component, "{}", event.message),
            }
        }
        self.event_log.append_all(&report.events)?;
        reports.push(report);
        Ok(())
    }
}

/// Sleeps in small slices until `deadline`, returning true if the shutdown
/// flag was raised first.
fn sleep_until(deadline: Instant, shutdown: &AtomicBool) -> bool {
    while Instant::now() < deadline {
        if shutdown.load(Ordering::SeqCst) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(remaining.min(SHUTDOWN_POLL));
    }
    shutdown.load(Ordering::SeqCst)
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("root", &self.storage.root())
            .field("cycles_run", &self.state.cycles_run)
            .finish()
    }
}
