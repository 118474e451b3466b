//! Orchestrator adapter: category-specific restarts and ticket filing.
//!
//! Restarts go through the orchestrator CLI rather than raw tmux kills so
//! each role's lifecycle hooks run; the supervisor only picks which argv to
//! invoke.

use crate::error::{Result, WardenError};
use crate::exec::{command_line, run_with_timeout};
use crate::session::SessionCategory;
use std::time::Duration;

pub trait Orchestrator {
    /// Terminates and relaunches the process hosted by a session of the
    /// given category.
    fn restart_session(&self, category: &SessionCategory) -> Result<()>;

    /// Files an improvement ticket with the orchestrator's tracker.
    fn file_ticket(&self, title: &str, body: &str) -> Result<()>;
}

/// `Orchestrator` backed by the fleet CLI (`gt` by default).
#[derive(Debug, Clone)]
pub struct CommandOrchestrator {
    program: String,
    timeout: Duration,
}

impl CommandOrchestrator {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let output = run_with_timeout(&self.program, args, None, self.timeout)?;
        if !output.status_ok {
            return Err(WardenError::CommandFailed {
                command: command_line(&self.program, args),
                details: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Orchestrator for CommandOrchestrator {
    fn restart_session(&self, category: &SessionCategory) -> Result<()> {
        let args = category.restart_args();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&argv)
    }

    fn file_ticket(&self, title: &str, body: &str) -> Result<()> {
        self.run(&["ticket", "create", "--title", title, "--body", body])
    }
}
